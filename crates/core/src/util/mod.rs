pub mod retry;
pub mod wav;

pub use retry::{is_http_retryable, retry_with_backoff, RetryConfig};
pub use wav::{encode_wav, write_wav};

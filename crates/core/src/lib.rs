pub mod catalog;
pub mod config;
pub mod decode;
pub mod diag;
pub mod emotion;
pub mod pipeline;
pub mod render;
pub mod throttle;
pub mod translate;
pub mod tts;
pub mod util;

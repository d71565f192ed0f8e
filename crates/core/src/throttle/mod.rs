//! Fixed-window request throttling keyed by client address.
//!
//! Every key gets `max_requests` admissions per window. The window starts on
//! the first request from a key and resets on the first request after it
//! elapses, so a burst straddling a reset can admit up to `2 * max_requests`.

mod clock;
mod store;

use crate::config::ThrottleConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{BucketStore, BucketUpdate, MemoryBucketStore, ThrottleBucket};

/// Outcome of one [`RequestThrottle::check`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThrottleDecision {
    pub allowed: bool,
    /// Admissions left in the current window, in `[0, max_requests - 1]`.
    pub remaining: u32,
    pub reset_in_ms: u64,
}

#[derive(Clone)]
pub struct RequestThrottle {
    config: ThrottleConfig,
    store: Arc<dyn BucketStore>,
    clock: Arc<dyn Clock>,
}

impl RequestThrottle {
    pub fn new(config: ThrottleConfig, store: Arc<dyn BucketStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            store,
            clock,
        }
    }

    /// In-memory store bounded by `config.capacity`, wall-clock time.
    pub fn in_memory(config: ThrottleConfig) -> Self {
        Self::new(
            config,
            Arc::new(MemoryBucketStore::new(config.capacity)),
            Arc::new(SystemClock),
        )
    }

    /// Counts one request from `key` and reports whether it may proceed.
    ///
    /// The read-compare-write on the key's bucket runs under the store's
    /// per-key exclusion, so concurrent checks never admit more than
    /// `max_requests` per window.
    pub fn check(&self, key: &str) -> ThrottleDecision {
        let now = self.clock.now_ms();
        let window_ms = self.config.window_ms;
        let max = self.config.max_requests;

        let decision = self.store.update(key, now, &mut |current| match current {
            Some(bucket) if !bucket.is_expired(now) => {
                let reset_in_ms = bucket.window_reset_at.saturating_sub(now);
                if bucket.count >= max {
                    (
                        bucket,
                        ThrottleDecision {
                            allowed: false,
                            remaining: 0,
                            reset_in_ms,
                        },
                    )
                } else {
                    let count = bucket.count + 1;
                    (
                        ThrottleBucket {
                            count,
                            window_reset_at: bucket.window_reset_at,
                        },
                        ThrottleDecision {
                            allowed: true,
                            remaining: max - count,
                            reset_in_ms,
                        },
                    )
                }
            }
            _ => (
                ThrottleBucket {
                    count: 1,
                    window_reset_at: now.saturating_add(window_ms),
                },
                ThrottleDecision {
                    allowed: true,
                    remaining: max - 1,
                    reset_in_ms: window_ms,
                },
            ),
        });

        if !decision.allowed {
            tracing::debug!(
                key = %key,
                reset_in_ms = decision.reset_in_ms,
                "request throttled"
            );
        }
        decision
    }

    pub fn sweep_expired(&self) -> usize {
        self.store.sweep_expired(self.clock.now_ms())
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}

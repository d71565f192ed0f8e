use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::throttle::ThrottleDecision;

/// Per-key admission state for one fixed window.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThrottleBucket {
    pub count: u32,
    /// Absolute time (ms since epoch) after which the window resets.
    pub window_reset_at: u64,
}

impl ThrottleBucket {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.window_reset_at
    }
}

/// Closure run by [`BucketStore::update`] with exclusive access to one key.
///
/// Receives the current bucket (if any) and returns the bucket to store along
/// with the decision to hand back to the caller.
pub type BucketUpdate<'a> =
    dyn FnMut(Option<ThrottleBucket>) -> (ThrottleBucket, ThrottleDecision) + 'a;

/// Concurrency-safe bucket table.
///
/// Implementations must run `apply` atomically with respect to other updates
/// of the same key, and must keep at most their configured capacity.
pub trait BucketStore: Send + Sync {
    fn update(&self, key: &str, now_ms: u64, apply: &mut BucketUpdate<'_>) -> ThrottleDecision;

    /// Drops every bucket whose window has elapsed; returns how many were removed.
    fn sweep_expired(&self, now_ms: u64) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;
}

/// In-memory buckets in a [`DashMap`], bounded by `capacity`.
///
/// Inserting a new key into a full store first sweeps expired buckets; if that
/// frees nothing it evicts the bucket closest to its reset. An evicted client
/// starts a fresh window on its next request. First requests from distinct
/// keys racing on a full store can overshoot until the next insert makes room.
pub struct MemoryBucketStore {
    buckets: DashMap<String, ThrottleBucket>,
    capacity: usize,
}

impl MemoryBucketStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buckets: DashMap::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    fn make_room(&self, now_ms: u64) {
        if self.buckets.len() < self.capacity {
            return;
        }
        let swept = self.sweep_expired(now_ms);
        if swept > 0 {
            tracing::debug!(swept, "swept expired throttle buckets");
            return;
        }

        while self.buckets.len() >= self.capacity {
            let victim = self
                .buckets
                .iter()
                .min_by_key(|bucket| bucket.window_reset_at)
                .map(|bucket| bucket.key().clone());
            let Some(key) = victim else {
                return;
            };
            tracing::debug!(key = %key, "throttle store full; evicting bucket nearest its reset");
            self.buckets.remove(&key);
        }
    }
}

impl BucketStore for MemoryBucketStore {
    fn update(&self, key: &str, now_ms: u64, apply: &mut BucketUpdate<'_>) -> ThrottleDecision {
        if !self.buckets.contains_key(key) {
            self.make_room(now_ms);
        }
        match self.buckets.entry(key.to_owned()) {
            Entry::Occupied(mut slot) => {
                let (next, decision) = apply(Some(*slot.get()));
                *slot.get_mut() = next;
                decision
            }
            Entry::Vacant(slot) => {
                let (next, decision) = apply(None);
                slot.insert(next);
                decision
            }
        }
    }

    fn sweep_expired(&self, now_ms: u64) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_expired(now_ms));
        before.saturating_sub(self.buckets.len())
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(store: &MemoryBucketStore, key: &str, now_ms: u64, reset_at: u64) {
        store.update(key, now_ms, &mut |_| {
            (
                ThrottleBucket {
                    count: 1,
                    window_reset_at: reset_at,
                },
                ThrottleDecision {
                    allowed: true,
                    remaining: 0,
                    reset_in_ms: 0,
                },
            )
        });
    }

    #[test]
    fn capacity_never_exceeded() {
        let store = MemoryBucketStore::new(4);
        for i in 0..20 {
            put(&store, &format!("10.0.0.{i}"), 0, 1_000 + i);
            assert!(store.len() <= 4);
        }
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn full_store_sweeps_expired_before_evicting_live_buckets() {
        let store = MemoryBucketStore::new(2);
        put(&store, "stale", 0, 100);
        put(&store, "live", 0, 10_000);

        // "stale" expired at t=100; inserting at t=500 must drop it, not "live".
        put(&store, "new", 500, 10_500);
        assert_eq!(store.len(), 2);

        let mut seen = None;
        store.update("live", 500, &mut |current| {
            seen = current;
            let b = current.unwrap_or(ThrottleBucket {
                count: 0,
                window_reset_at: 0,
            });
            (
                b,
                ThrottleDecision {
                    allowed: true,
                    remaining: 0,
                    reset_in_ms: 0,
                },
            )
        });
        assert_eq!(seen.map(|b| b.window_reset_at), Some(10_000));
    }

    #[test]
    fn sweep_expired_removes_only_elapsed_windows() {
        let store = MemoryBucketStore::new(100);
        put(&store, "a", 0, 100);
        put(&store, "b", 0, 200);
        put(&store, "c", 0, 300);

        assert_eq!(store.sweep_expired(200), 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.sweep_expired(1_000), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn full_store_without_expired_buckets_evicts_nearest_reset() {
        let store = MemoryBucketStore::new(2);
        put(&store, "late", 0, 9_000);
        put(&store, "soon", 0, 2_000);
        put(&store, "new", 500, 10_500);

        assert_eq!(store.len(), 2);
        assert_eq!(store.sweep_expired(2_001), 0);
        assert_eq!(store.sweep_expired(9_001), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let store = MemoryBucketStore::new(0);
        assert_eq!(store.capacity(), 1);
        put(&store, "a", 0, 100);
        put(&store, "b", 0, 200);
        assert_eq!(store.len(), 1);
    }
}

//! Failure tracker: consecutive-failure counters with a sliding TTL.
//!
//! Entries untouched for longer than the TTL read as absent even before
//! the sweeper reclaims them. Increments run under the map's shard lock, so
//! concurrent failures on one key are never lost.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use warden_common::FailureKey;

#[derive(Debug, Clone, Copy)]
struct Slot {
    count: u64,
    expires_at: Instant,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Time-bounded failure counters keyed by (action, identifier)
pub struct FailureTracker {
    entries: DashMap<FailureKey, Slot>,
    ttl: Duration,
}

impl FailureTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Stored count for a live key
    pub fn get(&self, key: &FailureKey) -> Option<u64> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| slot.count)
    }

    pub fn has(&self, key: &FailureKey) -> bool {
        self.get(key).is_some()
    }

    /// Store a count and restart the key's TTL window
    pub fn set(&self, key: FailureKey, count: u64) {
        let expires_at = Instant::now() + self.ttl;
        self.entries.insert(key, Slot { count, expires_at });
    }

    /// Add one failure, creating the entry at 1 if absent or expired.
    /// Returns the new count.
    pub fn increment(&self, key: FailureKey) -> u64 {
        let now = Instant::now();
        let expires_at = now + self.ttl;
        let mut slot = self
            .entries
            .entry(key)
            .or_insert(Slot { count: 0, expires_at });
        if slot.is_expired(now) {
            slot.count = 0;
        }
        slot.count = slot.count.saturating_add(1);
        slot.expires_at = expires_at;
        slot.count
    }

    /// Zero a live entry, keeping it with a fresh TTL. Absent keys stay
    /// absent. Returns true if an entry was reset.
    pub fn reset(&self, key: &FailureKey) -> bool {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut slot) if !slot.is_expired(now) => {
                slot.count = 0;
                slot.expires_at = now + self.ttl;
                true
            }
            _ => false,
        }
    }

    /// Drop expired entries, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, slot| !slot.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Physically present entries, expired ones included until swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(id: &str) -> FailureKey {
        FailureKey::new("User.Login", id)
    }

    #[test]
    fn test_increment_creates_at_one() {
        let tracker = FailureTracker::new(Duration::from_secs(3600));
        assert!(!tracker.has(&key("alice")));
        assert_eq!(tracker.increment(key("alice")), 1);
        assert_eq!(tracker.increment(key("alice")), 2);
        assert_eq!(tracker.get(&key("alice")), Some(2));
        assert_eq!(tracker.get(&key("bob")), None);
    }

    #[test]
    fn test_counters_are_per_action() {
        let tracker = FailureTracker::new(Duration::from_secs(3600));
        tracker.increment(FailureKey::new("User.Login", "alice"));
        assert_eq!(tracker.get(&FailureKey::new("User.Reset", "alice")), None);
    }

    #[test]
    fn test_reset_keeps_entry_at_zero() {
        let tracker = FailureTracker::new(Duration::from_secs(3600));
        assert!(!tracker.reset(&key("alice")));
        assert!(!tracker.has(&key("alice")));

        tracker.set(key("alice"), 5);
        assert!(tracker.reset(&key("alice")));
        assert_eq!(tracker.get(&key("alice")), Some(0));
        assert_eq!(tracker.increment(key("alice")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_expiry_and_sweep() {
        let tracker = FailureTracker::new(Duration::from_secs(60));
        tracker.set(key("alice"), 4);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(tracker.get(&key("alice")), Some(4));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(tracker.get(&key("alice")), None);
        assert!(!tracker.reset(&key("alice")));
        assert_eq!(tracker.len(), 1);

        // An expired entry restarts from one
        assert_eq!(tracker.increment(key("alice")), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(tracker.sweep(), 1);
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_restarts_window() {
        let tracker = FailureTracker::new(Duration::from_secs(60));
        tracker.increment(key("alice"));
        tokio::time::advance(Duration::from_secs(50)).await;
        tracker.increment(key("alice"));
        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(tracker.get(&key("alice")), Some(2));
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let tracker = Arc::new(FailureTracker::new(Duration::from_secs(3600)));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let tracker = tracker.clone();
                scope.spawn(move || {
                    for _ in 0..1000 {
                        tracker.increment(key("alice"));
                    }
                });
            }
        });

        assert_eq!(tracker.get(&key("alice")), Some(8000));
    }
}

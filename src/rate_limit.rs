// fixed-window attempt limiter; state is per process, keys come from forwarding headers
use crate::clock::Clock;
use crate::metrics::{RATE_LIMIT_KEYS, RATE_LIMIT_REJECTIONS};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

// Rate limit entry - tracks attempts per client key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub attempt_count: u32,
    pub window_start_ms: u64,
}

impl RateLimitEntry {
    fn fresh(now_ms: u64) -> Self {
        Self {
            attempt_count: 1,
            window_start_ms: now_ms,
        }
    }

    fn is_expired(&self, now_ms: u64, window_ms: u64) -> bool {
        now_ms.saturating_sub(self.window_start_ms) > window_ms
    }
}

pub trait RateLimitStore: Send + Sync {
    fn get(&self, key: &str) -> Option<RateLimitEntry>;
    fn set(&self, key: &str, entry: RateLimitEntry);
    // read-modify-write under the key's lock; `apply` sees the current entry
    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<RateLimitEntry>) -> RateLimitEntry,
    ) -> RateLimitEntry;
    fn delete(&self, key: &str);
    // drop expired entries, returns how many went
    fn sweep(&self, now_ms: u64, window_ms: u64) -> usize;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct InMemoryRateLimitStore {
    entries: DashMap<String, RateLimitEntry>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn get(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.get(key).map(|entry| *entry)
    }

    fn set(&self, key: &str, entry: RateLimitEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<RateLimitEntry>) -> RateLimitEntry,
    ) -> RateLimitEntry {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let next = apply(Some(*occupied.get()));
                *occupied.get_mut() = next;
                next
            }
            Entry::Vacant(vacant) => {
                let next = apply(None);
                vacant.insert(next);
                next
            }
        }
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    fn sweep(&self, now_ms: u64, window_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.is_expired(now_ms, window_ms));
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window: Duration,
    // table size that triggers a sweep of expired entries
    pub sweep_threshold: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
            sweep_threshold: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_in_ms: u64,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(
        config: RateLimitConfig,
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn window_ms(&self) -> u64 {
        self.config.window.as_millis() as u64
    }

    // record an attempt for `key`; a rejected attempt leaves the count untouched
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now_ms();
        let window_ms = self.window_ms();
        let max = self.config.max_attempts;

        if self.store.len() > self.config.sweep_threshold {
            let removed = self.store.sweep(now, window_ms);
            tracing::debug!(removed, remaining = self.store.len(), "rate limiter sweep");
        }

        let mut decision = RateLimitDecision {
            allowed: true,
            remaining: max.saturating_sub(1),
            reset_in_ms: window_ms,
        };
        let entry = self.store.update(key, &mut |current| match current {
            Some(entry) if !entry.is_expired(now, window_ms) => {
                let elapsed = now.saturating_sub(entry.window_start_ms);
                let reset_in_ms = window_ms.saturating_sub(elapsed);
                if entry.attempt_count >= max {
                    decision = RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        reset_in_ms,
                    };
                    entry
                } else {
                    let attempt_count = entry.attempt_count + 1;
                    decision = RateLimitDecision {
                        allowed: true,
                        remaining: max - attempt_count,
                        reset_in_ms,
                    };
                    RateLimitEntry {
                        attempt_count,
                        ..entry
                    }
                }
            }
            // no entry or window expired: hard reset
            _ => RateLimitEntry::fresh(now),
        });

        if !decision.allowed {
            RATE_LIMIT_REJECTIONS.inc();
            tracing::warn!(
                key,
                attempts = entry.attempt_count,
                reset_in_ms = decision.reset_in_ms,
                "rate limit exceeded"
            );
        }

        RATE_LIMIT_KEYS.set(self.store.len() as f64);
        decision
    }

    // forget all attempts for `key`, e.g. after a successful login
    pub fn reset(&self, key: &str) {
        self.store.delete(key);
        RATE_LIMIT_KEYS.set(self.store.len() as f64);
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const START: u64 = 1_700_000_000_000;

    fn limiter(max_attempts: u32, window_secs: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let limiter = RateLimiter::new(
            RateLimitConfig {
                max_attempts,
                window: Duration::from_secs(window_secs),
                sweep_threshold: 10_000,
            },
            Arc::new(InMemoryRateLimitStore::new()),
            clock.clone(),
        );
        (limiter, clock)
    }

    #[test]
    fn nth_attempt_rejected_only_after_max() {
        let (limiter, _) = limiter(5, 900);
        for n in 1..=5u32 {
            let decision = limiter.check("1.2.3.4");
            assert!(decision.allowed, "attempt {n} should pass");
            assert_eq!(decision.remaining, 5 - n);
        }
        let decision = limiter.check("1.2.3.4");
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn login_burst_then_block_reports_time_left() {
        let (limiter, clock) = limiter(5, 15 * 60);
        let mut last = None;
        for _ in 0..5 {
            clock.advance_ms(200);
            last = Some(limiter.check("1.2.3.4"));
        }
        let last = last.unwrap();
        assert!(last.allowed);
        assert_eq!(last.remaining, 0);

        let blocked = limiter.check("1.2.3.4");
        assert!(!blocked.allowed);
        // first attempt landed 200ms after START, now is START + 1000
        assert!((898_000..=900_000).contains(&blocked.reset_in_ms));
        assert_eq!(blocked.reset_in_ms, 899_200);
    }

    #[test]
    fn rejection_does_not_grow_the_counter() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let limiter = RateLimiter::new(
            RateLimitConfig {
                max_attempts: 2,
                ..RateLimitConfig::default()
            },
            store.clone(),
            Arc::new(ManualClock::new(START)),
        );
        for _ in 0..10 {
            limiter.check("k");
        }
        assert_eq!(store.get("k").unwrap().attempt_count, 2);
    }

    #[test]
    fn expired_window_starts_fresh() {
        let (limiter, clock) = limiter(3, 60);
        for _ in 0..4 {
            limiter.check("k");
        }
        assert!(!limiter.check("k").allowed);

        clock.advance_ms(60_001);
        let decision = limiter.check("k");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_in_ms, 60_000);
    }

    #[test]
    fn window_boundary_is_still_active() {
        let (limiter, clock) = limiter(1, 60);
        assert!(limiter.check("k").allowed);
        clock.advance_ms(60_000);
        let decision = limiter.check("k");
        assert!(!decision.allowed);
        assert_eq!(decision.reset_in_ms, 0);
    }

    #[test]
    fn reset_gives_a_full_budget() {
        let (limiter, _) = limiter(5, 900);
        for _ in 0..7 {
            limiter.check("k");
        }
        limiter.reset("k");
        let decision = limiter.check("k");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn keys_are_independent() {
        let (limiter, _) = limiter(1, 900);
        assert!(limiter.check("a").allowed);
        assert!(!limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
    }

    #[test]
    fn sweep_runs_once_table_passes_high_water_mark() {
        let clock = Arc::new(ManualClock::new(START));
        let store = Arc::new(InMemoryRateLimitStore::new());
        let limiter = RateLimiter::new(
            RateLimitConfig {
                max_attempts: 5,
                window: Duration::from_secs(10),
                sweep_threshold: 3,
            },
            store.clone(),
            clock.clone(),
        );
        for key in ["a", "b", "c", "d"] {
            limiter.check(key);
        }
        assert_eq!(store.len(), 4);

        clock.advance_ms(10_001);
        limiter.check("fresh");
        // the four stale entries are gone, only the new one is left
        assert_eq!(store.len(), 1);
        assert!(store.get("fresh").is_some());
    }

    #[test]
    fn sweep_keeps_live_entries() {
        let store = InMemoryRateLimitStore::new();
        store.set("old", RateLimitEntry { attempt_count: 3, window_start_ms: 0 });
        store.set("new", RateLimitEntry { attempt_count: 1, window_start_ms: 9_000 });
        assert_eq!(store.sweep(10_000, 5_000), 1);
        assert!(store.get("new").is_some());
        assert!(store.get("old").is_none());
    }

    #[test]
    fn concurrent_attempts_never_exceed_budget() {
        let (limiter, _) = limiter(5, 900);
        let allowed = std::sync::atomic::AtomicU32::new(0);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..10 {
                        if limiter.check("1.2.3.4").allowed {
                            allowed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        }
                    }
                });
            }
        });
        assert_eq!(allowed.into_inner(), 5);
    }

    #[test]
    fn update_sees_previous_entry() {
        let store = InMemoryRateLimitStore::new();
        let first = store.update("k", &mut |current| {
            assert!(current.is_none());
            RateLimitEntry::fresh(10)
        });
        assert_eq!(first.attempt_count, 1);
        let second = store.update("k", &mut |current| {
            let entry = current.unwrap();
            RateLimitEntry {
                attempt_count: entry.attempt_count + 1,
                ..entry
            }
        });
        assert_eq!(second, RateLimitEntry { attempt_count: 2, window_start_ms: 10 });
        assert_eq!(store.get("k"), Some(second));
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

/// Requests seen from one client in the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

impl RateLimitEntry {
    fn expired(
        &self,
        now: DateTime<Utc>,
    ) -> bool {
        now >= self.window_reset_at
    }
}

/// Where the counters live. `InMemoryStore` is enough for a single instance;
/// replicated deployments need something shared (e.g. redis) behind the same
/// trait, otherwise each replica enforces its own quota.
pub trait RateLimitStore: Send + Sync {
    fn get(
        &self,
        key: &str,
    ) -> Option<RateLimitEntry>;

    /// Store `entry`; it may be dropped once `entry.window_reset_at` passes.
    fn set(
        &self,
        key: &str,
        entry: RateLimitEntry,
    );

    /// Drop every entry whose window has ended. Returns how many went.
    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> usize;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> { Utc::now() }
}

#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }

    // a panic elsewhere while holding the lock leaves plain counters behind, which
    // are still usable
    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, RateLimitEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RateLimitStore for InMemoryStore {
    fn get(
        &self,
        key: &str,
    ) -> Option<RateLimitEntry> {
        self.entries().get(key).copied()
    }

    fn set(
        &self,
        key: &str,
        entry: RateLimitEntry,
    ) {
        self.entries().insert(key.to_string(), entry);
    }

    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| !e.expired(now));
        before - entries.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { count: u32 },
    Rejected { retry_after: Duration },
}

/// Fixed-window counter: at most `quota` requests per client per `window`,
/// the window starting at the client's first request. Bursts straddling a
/// window boundary can reach twice the quota; that is accepted.
pub struct FixedWindowLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    quota: u32,
    window: Duration,
    // get + set on the store are two calls; without this two concurrent requests
    // could both see `count < quota` and both get in
    lock: Mutex<()>,
}

impl FixedWindowLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        quota: u32,
        window: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            quota,
            window,
            lock: Mutex::new(()),
        }
    }

    pub fn check(
        &self,
        key: &str,
    ) -> RateLimitDecision {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        let entry = match self.store.get(key) {
            Some(entry) if !entry.expired(now) => entry,
            _ => {
                self.store.set(key, RateLimitEntry {
                    count: 1,
                    // a configured window may run past the end of time
                    window_reset_at: now
                        .checked_add_signed(self.window)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                });
                return RateLimitDecision::Allowed { count: 1 };
            }
        };

        if entry.count >= self.quota {
            return RateLimitDecision::Rejected {
                retry_after: entry.window_reset_at - now,
            };
        }

        let count = entry.count + 1;
        self.store.set(key, RateLimitEntry { count, ..entry });
        RateLimitDecision::Allowed { count }
    }
}

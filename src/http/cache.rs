//! TTL cache for GET responses, keyed by URL.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::http::Payload;

/// Source of monotonic time for TTL checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Used to exercise expiry without timers.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Payload,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl
    }
}

pub struct RequestCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl RequestCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            clock,
            default_ttl,
        }
    }

    /// Bound the cache to `capacity` entries, least recently used out first.
    /// `None` or zero keeps it unbounded; expiry is then the only eviction.
    pub fn with_capacity(self, capacity: Option<usize>) -> Self {
        match capacity.and_then(NonZeroUsize::new) {
            Some(capacity) => {
                self.lock().resize(capacity);
                self
            }
            None => self,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the stored value, evicting it first if it has outlived its TTL.
    pub fn get(&self, key: &str) -> Option<Payload> {
        let now = self.clock.now();
        let mut entries = self.lock();

        let expired = entries.peek(key)?.is_expired(now);
        if expired {
            entries.pop(key);
            tracing::debug!(key, "Evicted stale cache entry");
            return None;
        }

        entries.get(key).map(|entry| entry.data.clone())
    }

    /// Store with the cache's default TTL.
    pub fn put(&self, key: &str, data: Payload) {
        self.put_with_ttl(key, data, self.default_ttl);
    }

    pub fn put_with_ttl(&self, key: &str, data: Payload, ttl: Duration) {
        let entry = CacheEntry {
            data,
            stored_at: self.clock.now(),
            ttl,
        };
        let evicted = self.lock().push(key.to_string(), entry);

        if let Some((victim, _)) = evicted.filter(|(k, _)| k != key) {
            tracing::debug!(key = %victim, "Evicted least recently used cache entry");
        }
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        tracing::info!(entries = count, "Response cache cleared");
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

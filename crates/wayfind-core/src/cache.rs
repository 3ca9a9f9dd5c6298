use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A string-keyed cache whose entries live for a fixed duration.
///
/// Expiry is lazy: an expired entry stays in memory until the next read of
/// its key, which evicts it and reports a miss. Reads never extend an
/// entry's lifetime. There is no capacity bound.
///
/// A zero TTL disables the cache entirely.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: HashMap<String, Entry<V>>,
}

impl<V: Clone> TtlCache<V> {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Look up `key` as of `now`, evicting it if it expired.
    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<V> {
        let entry = self.entries.get(key)?;
        if now <= entry.expires_at {
            return Some(entry.value.clone());
        }
        self.entries.remove(key);
        tracing::trace!(key, "cache entry expired");
        None
    }

    pub fn set(&mut self, key: impl Into<String>, value: V) {
        self.set_at(key, value, Instant::now());
    }

    /// Insert or overwrite `key`, stamping it with `now + ttl`.
    pub fn set_at(&mut self, key: impl Into<String>, value: V, now: Instant) {
        if !self.is_enabled() {
            return;
        }
        let Some(expires_at) = now.checked_add(self.ttl) else {
            return;
        };
        self.entries.insert(key.into(), Entry { value, expires_at });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

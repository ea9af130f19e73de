//! Key/value cache with per-entry expiry
//!
//! Entries are purged lazily: an expired entry stays in memory until it is
//! looked up again or [`ExpiringCache::sweep`] runs. Time comes from
//! [`tokio::time::Instant`], so tests can drive it with a paused clock.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    /// `None` when the expiry overflows the clock
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Map whose entries expire after a per-entry duration
#[derive(Debug, Clone)]
pub struct ExpiringCache<K, V> {
    entries: HashMap<K, Entry<V>>,
}

impl<K, V> Default for ExpiringCache<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> ExpiringCache<K, V> {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` for `expire_in`
    ///
    /// A zero duration means the value is not cached; any previous entry for
    /// the key is dropped.
    pub fn set(&mut self, key: K, value: V, expire_in: Duration) {
        if expire_in.is_zero() {
            self.entries.remove(&key);
            return;
        }
        let expires_at = Instant::now().checked_add(expire_in);
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Look up a live entry, purging it if it has expired
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| &e.value)
    }

    /// Check for a live entry
    pub fn contains_key<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Remove an entry, live or not
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.remove(key).map(|e| e.value)
    }

    /// Purge every expired entry, returning how many were removed
    pub fn sweep(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        before - self.entries.len()
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

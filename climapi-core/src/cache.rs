//! Capacity-bounded in-memory cache with lazy TTL expiry.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::{Coordinate, provider::ProviderId};

/// Cache key for one provider's answer at one (rounded) location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub provider: ProviderId,
    /// Latitude and longitude in 1e-4 degree units.
    pub location: (i64, i64),
}

impl CacheKey {
    pub fn new(provider: ProviderId, coordinate: Coordinate) -> Self {
        Self {
            provider,
            location: coordinate.rounded(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    /// Insertion order; `Instant`s can tie.
    seq: u64,
}

#[derive(Debug)]
struct Entries<K, V> {
    map: HashMap<K, CacheEntry<V>>,
    next_seq: u64,
}

/// Thread-safe cache: entries expire `ttl` after insertion and the oldest
/// insertion is evicted once `max_size` is reached.
///
/// Expiry is checked on `get`; nothing runs in the background. Reading an
/// entry never extends its lifetime.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<Entries<K, V>>,
    ttl: Duration,
    max_size: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// `max_size` is clamped to at least one entry.
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::with_capacity(max_size),
                next_seq: 0,
            }),
            ttl,
            max_size,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Live value for `key`. An expired entry is dropped and reported absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        let entry = entries.map.get(key)?;

        if entry.inserted_at.elapsed() > self.ttl {
            entries.map.remove(key);
            trace!("cache entry expired");
            return None;
        }

        Some(entry.value.clone())
    }

    /// Insert or overwrite `key`, restarting its TTL.
    ///
    /// When a new key arrives at capacity the oldest insertion is evicted first,
    /// so `size() <= max_size()` holds whenever this returns.
    pub fn set(&self, key: K, value: V) {
        let mut entries = self.lock();

        if !entries.map.contains_key(&key) && entries.map.len() >= self.max_size {
            let oldest = entries
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.map.remove(&oldest);
                trace!(max_size = self.max_size, "cache evicted oldest entry");
            }
        }

        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.map.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                seq,
            },
        );
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn size(&self) -> usize {
        self.lock().map.len()
    }

    pub fn clear(&self) {
        self.lock().map.clear();
    }

    // A panic while holding the lock cannot leave the map half-updated,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Entries<K, V>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

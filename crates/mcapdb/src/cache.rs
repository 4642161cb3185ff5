//! Bounded LRU memoization in front of the store.
//!
//! Keys are `(entity_id, date, attribute)`. Definitive misses are cached as
//! [`CachedValue::Absent`] so absent rows are not re-queried; store errors are
//! never cached.

use chrono::NaiveDate;
use mcapdb_core::{Attribute, AttributeValue, EntityId, Result};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::hash::Hash;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Key for cached lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Requested entity.
    pub entity_id: EntityId,
    /// Requested date.
    pub date: NaiveDate,
    /// Requested attribute.
    pub attribute: Attribute,
}

impl CacheKey {
    /// Creates a new cache key.
    #[must_use]
    pub const fn new(entity_id: EntityId, date: NaiveDate, attribute: Attribute) -> Self {
        Self {
            entity_id,
            date,
            attribute,
        }
    }
}

/// A memoized lookup result.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    /// The row exists; this is the attribute's value.
    Found(AttributeValue),
    /// The store has no row for the key.
    Absent,
}

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to consult the store.
    pub misses: u64,
    /// Entries dropped to stay within capacity.
    pub evictions: u64,
}

/// Count-bounded LRU map.
///
/// Every access stamps the entry with a fresh tick; `order` maps ticks back to
/// keys so the least recently used entry is always the first one.
#[derive(Debug)]
struct Lru<K, V> {
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
    tick: u64,
    capacity: usize,
}

impl<K, V> Lru<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
            tick: 0,
            capacity: capacity.max(1),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Get a value and promote it to most recently used.
    fn get(&mut self, key: &K) -> Option<V> {
        let tick = self.next_tick();
        let (value, stamp) = self.entries.get_mut(key)?;
        self.order.remove(stamp);
        *stamp = tick;
        self.order.insert(tick, key.clone());
        Some(value.clone())
    }

    /// Insert a value as most recently used, returning how many entries were evicted.
    fn put(&mut self, key: K, value: V) -> usize {
        let tick = self.next_tick();
        if let Some((_, old)) = self.entries.insert(key.clone(), (value, tick)) {
            self.order.remove(&old);
        }
        self.order.insert(tick, key);

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            evicted += 1;
        }
        evicted
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn keys_by_recency(&self) -> Vec<K> {
        self.order.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[derive(Debug)]
struct State {
    lru: Lru<CacheKey, CachedValue>,
    stats: CacheStats,
}

/// Bounded least-recently-used cache for attribute lookups.
///
/// All access goes through one async mutex held for the whole
/// lookup/compute/insert sequence, so concurrent callers are serialized and the
/// eviction order depends only on the order of calls.
#[derive(Debug)]
pub struct LookupCache {
    state: Mutex<State>,
    capacity: usize,
}

impl LookupCache {
    /// Create an empty cache holding at most `capacity` entries (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let lru = Lru::new(capacity);
        let capacity = lru.capacity;
        Self {
            state: Mutex::new(State {
                lru,
                stats: CacheStats::default(),
            }),
            capacity,
        }
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return the cached value for `key`, or run `compute` and cache its result.
    ///
    /// A hit promotes the key to most recently used. On a miss the computed
    /// value (including [`CachedValue::Absent`]) is stored and, if the cache is
    /// over capacity, the least recently used entry is evicted.
    ///
    /// # Errors
    /// Returns the error from `compute` unchanged; nothing is cached in that case.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> Result<CachedValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedValue>>,
    {
        let mut state = self.state.lock().await;

        if let Some(value) = state.lru.get(&key) {
            state.stats.hits += 1;
            debug!(entity_id = %key.entity_id, date = %key.date, attribute = %key.attribute, "Cache hit");
            return Ok(value);
        }

        state.stats.misses += 1;
        debug!(entity_id = %key.entity_id, date = %key.date, attribute = %key.attribute, "Cache miss");

        let value = compute().await?;
        let evicted = state.lru.put(key, value.clone());
        if evicted > 0 {
            state.stats.evictions += evicted as u64;
            trace!(evicted, "Evicted least recently used entries");
        }
        Ok(value)
    }

    /// Returns true if `key` is cached. Does not affect recency.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().await.lru.contains(key)
    }

    /// Cached keys from least to most recently used.
    pub async fn keys_by_recency(&self) -> Vec<CacheKey> {
        self.state.lock().await.lru.keys_by_recency()
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.state.lock().await.lru.len()
    }

    /// Returns true if nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of the hit/miss/eviction counters.
    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.stats
    }

    /// Drop every cached entry. Counters are kept.
    pub async fn clear(&self) {
        self.state.lock().await.lru.clear();
        debug!("Cleared lookup cache");
    }
}

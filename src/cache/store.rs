//! The entity store: one slot per cache key, with per-key subscribers.
//!
//! The store holds no business logic. Coordinators drive it through `admit`/`begin_fetch`,
//! `set` and `invalidate`; every transition synchronously notifies the subscribers of that exact
//! key, after the slot lock has been released.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use time::OffsetDateTime;
use tracing::debug;

use crate::application::error::CatalogError;

use super::config::CacheConfig;
use super::entry::{CacheEntry, QueryStatus};
use super::keys::{KeySelector, StoreKey};
use super::lock::lock_or_recover;

const SOURCE: &str = "cache::store";
const METRIC_STORE_EVICT: &str = "folio_store_evict_total";

type Listener<K, V> = Arc<dyn Fn(&CacheEntry<K, V>) + Send + Sync>;

/// Result of asking the store whether a query needs a fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission<V> {
    /// Fresh value; no fetch needed.
    Cached(V),
    /// Another caller's fetch is in flight; wait for it.
    Joined,
    /// The caller owns a new fetch for this generation.
    Started { generation: u64 },
}

/// Whether a settled response was applied to its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    Applied,
    /// A newer fetch superseded this one, or the slot already settled.
    Discarded { current: u64 },
}

struct Slot<K, V> {
    entry: CacheEntry<K, V>,
    /// Invalidated while loading: the value about to land was requested before the change.
    invalidated_in_flight: bool,
}

impl<K, V> Slot<K, V> {
    fn new(key: K) -> Self {
        Self {
            entry: CacheEntry::idle(key),
            invalidated_in_flight: false,
        }
    }

    fn start_fetch(&mut self) -> u64 {
        self.entry.generation += 1;
        self.entry.status = QueryStatus::Loading;
        self.invalidated_in_flight = false;
        self.entry.generation
    }
}

struct Listeners<K, V> {
    next_id: u64,
    by_key: HashMap<K, Vec<(u64, Listener<K, V>)>>,
}

impl<K: StoreKey, V> Listeners<K, V> {
    fn remove(&mut self, key: &K, id: u64) {
        if let Some(list) = self.by_key.get_mut(key) {
            list.retain(|(existing, _)| *existing != id);
            if list.is_empty() {
                self.by_key.remove(key);
            }
        }
    }
}

/// Keeps a subscriber registered. Dropping it (or calling `unsubscribe`) removes the callback.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// In-memory cache of query results keyed by query identity.
///
/// Construct one per session and share it by `Arc` with the coordinators.
pub struct EntityStore<K, V> {
    slots: Mutex<LruCache<K, Slot<K, V>>>,
    listeners: Arc<Mutex<Listeners<K, V>>>,
    max_entries: NonZeroUsize,
}

impl<K, V> EntityStore<K, V>
where
    K: StoreKey,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            slots: Mutex::new(LruCache::unbounded()),
            listeners: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                by_key: HashMap::new(),
            })),
            max_entries: config.max_entries_non_zero(),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Snapshot of the entry for `key`; an `Idle` entry when nothing is cached.
    pub fn get(&self, key: &K) -> CacheEntry<K, V> {
        lock_or_recover(&self.slots, SOURCE, "get")
            .get(key)
            .map(|slot| slot.entry.clone())
            .unwrap_or_else(|| CacheEntry::idle(key.clone()))
    }

    pub fn keys(&self) -> Vec<K> {
        lock_or_recover(&self.slots, SOURCE, "keys")
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Cached keys chosen by `selector`, most recently used first.
    pub fn keys_matching<S>(&self, selector: &S) -> Vec<K>
    where
        S: KeySelector<K> + ?Sized,
    {
        lock_or_recover(&self.slots, SOURCE, "keys_matching")
            .iter()
            .filter(|(key, _)| selector.selects(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.slots, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Decide, atomically, whether a query for `key` is served from cache, joins the fetch in
    /// flight, or starts a new fetch.
    ///
    /// `force_refresh` skips both the cache and the in-flight fetch; the new generation
    /// supersedes whatever is loading. So does a query arriving after the loading entry was
    /// invalidated.
    pub fn admit(
        &self,
        key: &K,
        force_refresh: bool,
        stale_after: Option<Duration>,
    ) -> Admission<V> {
        let now = OffsetDateTime::now_utc();
        let snapshot = {
            let mut slots = lock_or_recover(&self.slots, SOURCE, "admit");
            if !force_refresh && let Some(slot) = slots.get(key) {
                if slot.entry.is_fresh(stale_after, now)
                    && let Some(value) = &slot.entry.value
                {
                    return Admission::Cached(value.clone());
                }
                // A fetch that started before an invalidation would return pre-change data.
                if slot.entry.is_loading() && !slot.invalidated_in_flight {
                    return Admission::Joined;
                }
            }
            self.start_locked(&mut slots, key)
        };
        let generation = snapshot.generation;
        self.notify(&snapshot);
        Admission::Started { generation }
    }

    /// Unconditionally start a fetch for `key`, returning its generation.
    pub fn begin_fetch(&self, key: &K) -> u64 {
        let snapshot = {
            let mut slots = lock_or_recover(&self.slots, SOURCE, "begin_fetch");
            self.start_locked(&mut slots, key)
        };
        let generation = snapshot.generation;
        self.notify(&snapshot);
        generation
    }

    /// Settle the fetch of `generation`.
    ///
    /// Applied only when `generation` is still the slot's current generation and the slot is
    /// loading. A failure keeps the last good value next to the error.
    pub fn set(&self, key: &K, result: Result<V, CatalogError>, generation: u64) -> Settle {
        let snapshot = {
            let mut slots = lock_or_recover(&self.slots, SOURCE, "set");
            let Some(slot) = slots.peek_mut(key) else {
                return Settle::Discarded { current: 0 };
            };
            let current = slot.entry.generation;
            if current != generation || !slot.entry.is_loading() {
                return Settle::Discarded { current };
            }

            let entry = &mut slot.entry;
            match result {
                Ok(value) => {
                    entry.value = Some(value);
                    entry.status = QueryStatus::Success;
                    entry.error = None;
                    entry.fetched_at = Some(OffsetDateTime::now_utc());
                    entry.stale = slot.invalidated_in_flight;
                }
                Err(error) => {
                    entry.status = QueryStatus::Error;
                    entry.error = Some(error);
                    entry.stale |= slot.invalidated_in_flight;
                }
            }
            slot.invalidated_in_flight = false;
            slot.entry.clone()
        };
        self.notify(&snapshot);
        Settle::Applied
    }

    /// Mark `key` stale without dropping its value. Returns false when nothing is cached.
    ///
    /// Invalidating a loading entry also marks the response in flight as stale on arrival.
    pub fn invalidate(&self, key: &K) -> bool {
        let snapshot = {
            let mut slots = lock_or_recover(&self.slots, SOURCE, "invalidate");
            let Some(slot) = slots.peek_mut(key) else {
                return false;
            };
            slot.entry.stale = true;
            if slot.entry.is_loading() {
                slot.invalidated_in_flight = true;
            }
            slot.entry.clone()
        };
        self.notify(&snapshot);
        true
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Register `callback` for every transition of `key`.
    pub fn subscribe<F>(&self, key: &K, callback: F) -> Subscription
    where
        F: Fn(&CacheEntry<K, V>) + Send + Sync + 'static,
    {
        let id = {
            let mut listeners = lock_or_recover(&self.listeners, SOURCE, "subscribe");
            listeners.next_id += 1;
            let id = listeners.next_id;
            listeners
                .by_key
                .entry(key.clone())
                .or_default()
                .push((id, Arc::new(callback)));
            id
        };

        let registry: Weak<Mutex<Listeners<K, V>>> = Arc::downgrade(&self.listeners);
        let key = key.clone();
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    lock_or_recover(&registry, SOURCE, "unsubscribe").remove(&key, id);
                }
            })),
        }
    }

    pub fn subscriber_count(&self, key: &K) -> usize {
        lock_or_recover(&self.listeners, SOURCE, "subscriber_count")
            .by_key
            .get(key)
            .map_or(0, Vec::len)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn start_locked(&self, slots: &mut LruCache<K, Slot<K, V>>, key: &K) -> CacheEntry<K, V> {
        let inserted = !slots.contains(key);
        let slot = slots.get_or_insert_mut(key.clone(), || Slot::new(key.clone()));
        slot.start_fetch();
        let snapshot = slot.entry.clone();
        if inserted {
            self.evict_over_capacity(slots, key);
        }
        snapshot
    }

    /// Drop least recently used entries above the soft cap. Loading and subscribed entries are
    /// kept even if that leaves the store over capacity.
    fn evict_over_capacity(&self, slots: &mut LruCache<K, Slot<K, V>>, keep: &K) {
        while slots.len() > self.max_entries.get() {
            let victim = {
                let listeners = lock_or_recover(&self.listeners, SOURCE, "evict");
                slots
                    .iter()
                    .rev()
                    .find(|(key, slot)| {
                        *key != keep
                            && !slot.entry.is_loading()
                            && !listeners.by_key.contains_key(*key)
                    })
                    .map(|(key, _)| key.clone())
            };
            let Some(victim) = victim else {
                break;
            };
            slots.pop(&victim);
            counter!(METRIC_STORE_EVICT).increment(1);
            debug!(key = %victim, "Evicted cache entry");
        }
    }

    fn notify(&self, entry: &CacheEntry<K, V>) {
        let callbacks: Vec<Listener<K, V>> = {
            let listeners = lock_or_recover(&self.listeners, SOURCE, "notify");
            listeners
                .by_key
                .get(&entry.key)
                .map(|list| list.iter().map(|(_, callback)| Arc::clone(callback)).collect())
                .unwrap_or_default()
        };
        for callback in callbacks {
            callback(entry);
        }
    }
}

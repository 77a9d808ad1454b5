//! Query coordination: cache hits, request de-duplication and generation-ordered settling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::sync::Notify;
use tracing::{debug, instrument};

use crate::application::error::CatalogError;

use super::entry::QueryStatus;
use super::keys::StoreKey;
use super::lock::lock_or_recover;
use super::store::{Admission, EntityStore, Settle};

const SOURCE: &str = "cache::query";
const METRIC_QUERY_HIT: &str = "folio_query_cache_hit_total";
const METRIC_QUERY_MISS: &str = "folio_query_cache_miss_total";
const METRIC_QUERY_JOIN: &str = "folio_query_dedup_join_total";
const METRIC_QUERY_DISCARDED: &str = "folio_query_discarded_total";
const METRIC_QUERY_FETCH_MS: &str = "folio_query_fetch_ms";

/// Per-call query options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Fetch even when a fresh value or an in-flight request exists.
    pub force_refresh: bool,
    /// Overrides the coordinator's default age limit for this call.
    pub stale_after: Option<Duration>,
}

impl QueryOptions {
    pub fn forced() -> Self {
        Self {
            force_refresh: true,
            ..Self::default()
        }
    }
}

/// What a view renders for a key at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot<V> {
    pub status: QueryStatus,
    pub data: Option<V>,
    pub error: Option<CatalogError>,
    /// `data` belongs to the placeholder key, not to the requested one.
    pub is_placeholder: bool,
    pub is_stale: bool,
}

/// Resolves queries against the entity store, issuing at most one fetch per key at a time.
pub struct QueryCoordinator<K, V> {
    store: Arc<EntityStore<K, V>>,
    signals: Mutex<HashMap<K, Arc<Notify>>>,
    stale_after: Option<Duration>,
}

impl<K, V> QueryCoordinator<K, V>
where
    K: StoreKey,
    V: Clone + Send + Sync + 'static,
{
    /// `stale_after` is the default age limit for successful entries; `None` disables aging.
    pub fn new(store: Arc<EntityStore<K, V>>, stale_after: Option<Duration>) -> Self {
        Self {
            store,
            signals: Mutex::new(HashMap::new()),
            stale_after,
        }
    }

    pub fn store(&self) -> &Arc<EntityStore<K, V>> {
        &self.store
    }

    /// Resolve `key`, calling `fetch` only when this caller owns a new fetch.
    ///
    /// A fresh success returns without touching the network. A fetch already in flight for the
    /// same key is joined. A response that a newer fetch superseded is dropped, and the caller
    /// receives the newer fetch's result instead.
    #[instrument(skip_all, fields(key = %key, force = options.force_refresh))]
    pub async fn query<F, Fut>(
        &self,
        key: &K,
        options: QueryOptions,
        fetch: F,
    ) -> Result<V, CatalogError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CatalogError>>,
    {
        let stale_after = options.stale_after.or(self.stale_after);
        let generation = match self.store.admit(key, options.force_refresh, stale_after) {
            Admission::Cached(value) => {
                counter!(METRIC_QUERY_HIT).increment(1);
                debug!("Served from cache");
                return Ok(value);
            }
            Admission::Joined => {
                counter!(METRIC_QUERY_JOIN).increment(1);
                debug!("Joined in-flight request");
                return self.wait_for_settle(key).await;
            }
            Admission::Started { generation } => generation,
        };

        counter!(METRIC_QUERY_MISS).increment(1);
        let started_at = Instant::now();
        let pending = PendingFetch {
            queries: self,
            key,
            generation,
            armed: true,
        };
        let result = fetch().await;
        pending.disarm();
        histogram!(METRIC_QUERY_FETCH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        match self.store.set(key, result.clone(), generation) {
            Settle::Applied => {
                self.wake(key);
                result
            }
            Settle::Discarded { current } => {
                counter!(METRIC_QUERY_DISCARDED).increment(1);
                debug!(generation, current, "Discarded superseded response");
                self.wait_for_settle(key).await
            }
        }
    }

    /// Current view of `key`. With `placeholder`, a loading key with no value of its own shows
    /// the placeholder's successful value instead.
    pub fn snapshot(&self, key: &K, placeholder: Option<&K>) -> QuerySnapshot<V> {
        let entry = self.store.get(key);
        let mut snapshot = QuerySnapshot {
            status: entry.status,
            data: entry.value,
            error: entry.error,
            is_placeholder: false,
            is_stale: entry.stale,
        };
        if snapshot.data.is_none()
            && snapshot.status == QueryStatus::Loading
            && let Some(previous) = placeholder
        {
            let previous = self.store.get(previous);
            if previous.status == QueryStatus::Success && previous.value.is_some() {
                snapshot.data = previous.value;
                snapshot.is_placeholder = true;
            }
        }
        snapshot
    }

    async fn wait_for_settle(&self, key: &K) -> Result<V, CatalogError> {
        loop {
            let signal = self.signal(key);
            let notified = signal.notified();
            let entry = self.store.get(key);
            if let Some(outcome) = entry.outcome() {
                return outcome;
            }
            if entry.status == QueryStatus::Idle {
                return Err(CatalogError::transport(
                    "query",
                    format!("`{key}` was dropped while a request was in flight"),
                ));
            }
            notified.await;
        }
    }

    fn signal(&self, key: &K) -> Arc<Notify> {
        let mut signals = lock_or_recover(&self.signals, SOURCE, "signal");
        Arc::clone(signals.entry(key.clone()).or_default())
    }

    fn wake(&self, key: &K) {
        let signal = lock_or_recover(&self.signals, SOURCE, "wake").remove(key);
        if let Some(signal) = signal {
            signal.notify_waiters();
        }
    }
}

/// Settles a fetch whose future was dropped before completing, so the slot does not stay
/// `Loading` and joined callers are released with an error.
struct PendingFetch<'a, K, V>
where
    K: StoreKey,
    V: Clone + Send + Sync + 'static,
{
    queries: &'a QueryCoordinator<K, V>,
    key: &'a K,
    generation: u64,
    armed: bool,
}

impl<K, V> PendingFetch<'_, K, V>
where
    K: StoreKey,
    V: Clone + Send + Sync + 'static,
{
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<K, V> Drop for PendingFetch<'_, K, V>
where
    K: StoreKey,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let error = CatalogError::transport("query", "request abandoned before completion");
        if self.queries.store.set(self.key, Err(error), self.generation) == Settle::Applied {
            debug!(key = %self.key, generation = self.generation, "Settled abandoned fetch");
            self.queries.wake(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::oneshot;

    use super::*;
    use crate::cache::config::CacheConfig;

    fn coordinator() -> Arc<QueryCoordinator<String, u32>> {
        let store = Arc::new(EntityStore::new(&CacheConfig::default()));
        Arc::new(QueryCoordinator::new(store, None))
    }

    #[tokio::test]
    async fn second_query_is_served_from_cache() {
        let queries = coordinator();
        let key = "a".to_string();
        let fetches = AtomicUsize::new(0);
        let calls = &fetches;

        for _ in 0..2 {
            let value = queries
                .query(&key, QueryOptions::default(), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await;
            assert_eq!(value, Ok(7));
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_queries_share_one_fetch() {
        let queries = coordinator();
        let key = "a".to_string();
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<()>();

        let leader = {
            let queries = Arc::clone(&queries);
            let key = key.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                queries
                    .query(&key, QueryOptions::default(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let _ = gate.await;
                        Ok(11)
                    })
                    .await
            })
        };
        while !queries.store().get(&key).is_loading() {
            tokio::task::yield_now().await;
        }

        let follower = {
            let queries = Arc::clone(&queries);
            let key = key.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                queries
                    .query(&key, QueryOptions::default(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(99)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        release.send(()).expect("leader waiting");

        assert_eq!(leader.await.expect("leader"), Ok(11));
        assert_eq!(follower.await.expect("follower"), Ok(11));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_is_stored_and_shared() {
        let queries = coordinator();
        let key = "a".to_string();
        let result = queries
            .query(&key, QueryOptions::default(), || async {
                Err(CatalogError::transport("fetch", "502"))
            })
            .await;
        assert_eq!(result, Err(CatalogError::transport("fetch", "502")));

        let snapshot = queries.snapshot(&key, None);
        assert_eq!(snapshot.status, QueryStatus::Error);
        assert!(snapshot.error.is_some());

        // An errored entry is refetched on the next query.
        let retried = queries
            .query(&key, QueryOptions::default(), || async { Ok(1) })
            .await;
        assert_eq!(retried, Ok(1));
    }

    #[tokio::test]
    async fn forced_refresh_bypasses_fresh_value() {
        let queries = coordinator();
        let key = "a".to_string();
        queries
            .query(&key, QueryOptions::default(), || async { Ok(1) })
            .await
            .expect("first");
        let refreshed = queries
            .query(&key, QueryOptions::forced(), || async { Ok(2) })
            .await;
        assert_eq!(refreshed, Ok(2));
    }

    #[tokio::test]
    async fn expired_value_is_refetched() {
        let store = Arc::new(EntityStore::new(&CacheConfig::default()));
        let queries = QueryCoordinator::new(store, Some(Duration::ZERO));
        let key = "a".to_string();
        queries
            .query(&key, QueryOptions::default(), || async { Ok(1) })
            .await
            .expect("first");
        let second = queries
            .query(&key, QueryOptions::default(), || async { Ok(2) })
            .await;
        assert_eq!(second, Ok(2));
    }

    #[tokio::test]
    async fn placeholder_shows_previous_page_while_loading() {
        let queries = coordinator();
        let page_one = "page:1".to_string();
        let page_two = "page:2".to_string();
        queries
            .query(&page_one, QueryOptions::default(), || async { Ok(10) })
            .await
            .expect("page one");
        queries.store().begin_fetch(&page_two);

        let without = queries.snapshot(&page_two, None);
        assert_eq!(without.data, None);
        assert!(!without.is_placeholder);

        let with = queries.snapshot(&page_two, Some(&page_one));
        assert_eq!(with.status, QueryStatus::Loading);
        assert_eq!(with.data, Some(10));
        assert!(with.is_placeholder);
    }

    #[tokio::test]
    async fn dropped_fetch_settles_as_error_and_releases_joiners() {
        let queries = coordinator();
        let key = "a".to_string();
        let (_release, gate) = oneshot::channel::<()>();

        let owner = tokio::time::timeout(
            Duration::from_millis(50),
            queries.query(&key, QueryOptions::default(), || async move {
                let _ = gate.await;
                Ok(1)
            }),
        );
        let joiner = async {
            while !queries.store().get(&key).is_loading() {
                tokio::task::yield_now().await;
            }
            queries
                .query(&key, QueryOptions::default(), || async { Ok(2) })
                .await
        };
        let (owner, joined) = tokio::join!(owner, joiner);

        assert!(owner.is_err(), "owner should time out");
        assert!(joined.expect_err("joiner released").is_transport());
        assert_eq!(queries.store().get(&key).status, QueryStatus::Error);

        let retried = tokio::time::timeout(
            Duration::from_secs(1),
            queries.query(&key, QueryOptions::default(), || async { Ok(3) }),
        )
        .await
        .expect("next query is not stuck");
        assert_eq!(retried, Ok(3));
    }
}

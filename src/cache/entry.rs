use std::time::Duration;

use time::OffsetDateTime;

use crate::application::error::CatalogError;

/// Lifecycle of one cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// A snapshot of one store slot. Handed out by value; mutating it does not touch the store.
#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    pub key: K,
    /// Last value fetched successfully. Kept across `Loading` and `Error`.
    pub value: Option<V>,
    pub status: QueryStatus,
    /// Error of the most recent failed fetch; cleared by the next success.
    pub error: Option<CatalogError>,
    pub fetched_at: Option<OffsetDateTime>,
    /// Incremented on every fetch start.
    pub generation: u64,
    /// Set by invalidation; cleared when a fetch that started after it succeeds.
    pub stale: bool,
}

impl<K, V> CacheEntry<K, V> {
    pub(crate) fn idle(key: K) -> Self {
        Self {
            key,
            value: None,
            status: QueryStatus::Idle,
            error: None,
            fetched_at: None,
            generation: 0,
            stale: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    /// True when a successful value may be served without a fetch.
    ///
    /// `stale_after` of `None` means the value never ages out; only invalidation makes it stale.
    pub fn is_fresh(&self, stale_after: Option<Duration>, now: OffsetDateTime) -> bool {
        if self.status != QueryStatus::Success || self.stale || self.value.is_none() {
            return false;
        }
        match (stale_after, self.fetched_at) {
            (None, _) => true,
            (Some(limit), Some(fetched_at)) => now - fetched_at < limit,
            (Some(_), None) => false,
        }
    }
}

impl<K, V: Clone> CacheEntry<K, V> {
    /// The settled result, or `None` while the entry is idle or loading.
    pub fn outcome(&self) -> Option<Result<V, CatalogError>> {
        match self.status {
            QueryStatus::Idle | QueryStatus::Loading => None,
            QueryStatus::Success => Some(self.value.clone().ok_or(CatalogError::EmptyResult {
                what: "cache entry",
            })),
            QueryStatus::Error => Some(Err(self.error.clone().unwrap_or_else(|| {
                CatalogError::transport("query", "request failed without detail")
            }))),
        }
    }
}

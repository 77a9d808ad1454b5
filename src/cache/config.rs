//! Cache configuration, derived from the `[cache]` section of `folio.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_MAX_ENTRIES: usize = 500;
const DEFAULT_STALE_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Soft cap on cached keys. Loading or subscribed entries are never evicted.
    pub max_entries: usize,
    /// Age after which a successful entry is refetched on next query. `None` disables aging.
    pub stale_after: Option<Duration>,
    /// Refetch invalidated keys that still have subscribers once a mutation succeeds.
    pub refetch_active_on_invalidate: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            stale_after: Some(Duration::from_secs(DEFAULT_STALE_AFTER_SECS)),
            refetch_active_on_invalidate: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            max_entries: settings.max_entries.get(),
            stale_after: settings.stale_after,
            refetch_active_on_invalidate: settings.refetch_active_on_invalidate,
        }
    }
}

impl CacheConfig {
    /// Returns `max_entries` as `NonZeroUsize`, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}

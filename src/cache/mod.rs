//! Folio query cache
//!
//! Client-side synchronisation layer between catalog views and the remote API:
//!
//! - **Entity store**: one slot per query key with status, value, error and generation
//! - **Query coordinator**: cache hits, request de-duplication, generation-ordered settling
//! - **Mutation coordinator**: one write, then invalidation of every affected key
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `folio.toml`:
//!
//! ```toml
//! [cache]
//! max_entries = 500
//! stale_after_seconds = 60
//! refetch_active_on_invalidate = true
//! ```

mod config;
mod entry;
mod keys;
mod lock;
mod mutation;
mod planner;
mod query;
mod store;

pub use config::CacheConfig;
pub use entry::{CacheEntry, QueryStatus};
pub use keys::{CacheKey, Invalidation, KeySelector, StoreKey};
pub use mutation::{MutationCoordinator, MutationOutcome};
pub use planner::{InvalidationPlan, MutationKind};
pub use query::{QueryCoordinator, QueryOptions, QuerySnapshot};
pub use store::{Admission, EntityStore, Settle, Subscription};

pub(crate) use lock::lock_or_recover;

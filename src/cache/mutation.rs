//! Mutation coordination: run one write, then invalidate what it affected.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use metrics::counter;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::error::CatalogError;

use super::keys::{KeySelector, StoreKey};
use super::store::EntityStore;

const METRIC_MUTATION: &str = "folio_mutation_total";
const METRIC_INVALIDATED_KEYS: &str = "folio_invalidated_keys_total";

/// A successful write and the cached keys it invalidated.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome<T, K> {
    pub value: T,
    pub invalidated: Vec<K>,
}

pub struct MutationCoordinator<K, V> {
    store: Arc<EntityStore<K, V>>,
}

impl<K, V> MutationCoordinator<K, V>
where
    K: StoreKey,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(store: Arc<EntityStore<K, V>>) -> Self {
        Self { store }
    }

    /// Await `action` once. On success invalidate every cached key chosen by `invalidates`;
    /// on failure return the error and leave the store untouched.
    #[instrument(skip_all, fields(mutation = name, mutation_id = %Uuid::new_v4()))]
    pub async fn mutate<T, Fut, S>(
        &self,
        name: &'static str,
        action: Fut,
        invalidates: &[S],
    ) -> Result<MutationOutcome<T, K>, CatalogError>
    where
        Fut: Future<Output = Result<T, CatalogError>>,
        S: KeySelector<K> + fmt::Display,
    {
        match action.await {
            Ok(value) => {
                counter!(METRIC_MUTATION, "outcome" => "success").increment(1);
                let invalidated = self.invalidate_all(invalidates);
                info!(
                    invalidated = invalidated.len(),
                    targets = %DisplayList(invalidates),
                    "Mutation succeeded"
                );
                Ok(MutationOutcome { value, invalidated })
            }
            Err(error) => {
                counter!(METRIC_MUTATION, "outcome" => "failure").increment(1);
                warn!(error = %error, "Mutation failed; cache left untouched");
                Err(error)
            }
        }
    }

    /// Invalidate each cached key chosen by any selector, once. Returns the keys in the order
    /// they were invalidated.
    pub fn invalidate_all<S>(&self, selectors: &[S]) -> Vec<K>
    where
        S: KeySelector<K>,
    {
        let mut seen = HashSet::new();
        let mut invalidated = Vec::new();
        for selector in selectors {
            for key in self.store.keys_matching(selector) {
                if seen.insert(key.clone()) && self.store.invalidate(&key) {
                    invalidated.push(key);
                }
            }
        }
        counter!(METRIC_INVALIDATED_KEYS).increment(invalidated.len() as u64);
        invalidated
    }
}

struct DisplayList<'a, S>(&'a [S]);

impl<S: fmt::Display> fmt::Display for DisplayList<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, item) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            item.fmt(f)?;
        }
        Ok(())
    }
}

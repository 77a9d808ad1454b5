use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Lock session state, recovering the guard if a previous holder panicked.
///
/// Critical sections are short synchronous updates that leave the data structurally valid,
/// so a poisoned guard is still usable. Never hold the guard across an `.await`.
pub(crate) fn lock_or_recover<'a, T>(
    lock: &'a Mutex<T>,
    component: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            op,
            component,
            result = "poisoned_recovered",
            "Recovered poisoned lock; a previous holder panicked"
        );
        poisoned.into_inner()
    })
}

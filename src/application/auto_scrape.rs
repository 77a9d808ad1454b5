//! Trigger-on-empty auto-scrape.
//!
//! `AutoScrapeController` watches the navigation query. When the catalog turns out to be empty
//! it fires one scrape for its target, waits for the invalidated navigation to be refetched,
//! and settles. The one-shot guard lives in the session's `ScrapeRegistry`, keyed by target, so
//! any number of controllers observing the same empty catalog fire at most one scrape between
//! them.
//!
//! ```text
//! Idle -> Checking -> Settled(Populated)
//!           |
//!           v
//!        Scraping -> Recovering -> Settled(Populated | NoDataAvailable)
//!           |            |
//!           v            +--> Scraping (bounded automatic retries)
//!         Failed --retry()--> Idle
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use metrics::counter;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::application::catalog::CatalogService;
use crate::application::error::CatalogError;
use crate::cache::{QueryOptions, lock_or_recover};
use crate::domain::ScrapeTarget;
use crate::domain::navigation::is_catalog_empty;

const SOURCE: &str = "application::auto_scrape";
const METRIC_AUTO_SCRAPE_FIRED: &str = "folio_auto_scrape_fired_total";
const EMPTY_CATALOG: &str = "catalog navigation";

/// How a controller finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Populated,
    /// The remote had nothing to ingest even after the automatic retries.
    NoDataAvailable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeState {
    Idle,
    Checking,
    Scraping { attempt: u32 },
    Recovering { attempt: u32 },
    Settled(Settlement),
    Failed { error: CatalogError },
}

impl ScrapeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled(_) | Self::Failed { .. })
    }

    /// The terminal state as a result: a populated catalog is `Ok`, an empty one is
    /// `EmptyResult`, a failure is its error. `None` while the controller is still running.
    pub fn outcome(&self) -> Option<Result<(), CatalogError>> {
        match self {
            Self::Settled(Settlement::Populated) => Some(Ok(())),
            Self::Settled(Settlement::NoDataAvailable) => {
                Some(Err(CatalogError::empty(EMPTY_CATALOG)))
            }
            Self::Failed { error } => Some(Err(error.clone())),
            Self::Idle | Self::Checking | Self::Scraping { .. } | Self::Recovering { .. } => None,
        }
    }
}

impl fmt::Display for ScrapeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Checking => f.write_str("checking"),
            Self::Scraping { attempt } => write!(f, "scraping (attempt {attempt})"),
            Self::Recovering { attempt } => write!(f, "recovering (attempt {attempt})"),
            Self::Settled(Settlement::Populated) => f.write_str("settled: populated"),
            Self::Settled(Settlement::NoDataAvailable) => f.write_str("settled: no data available"),
            Self::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

// ============================================================================
// Session-wide one-shot guard
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Guard {
    InFlight,
    Succeeded,
    Failed(CatalogError),
}

/// Result of trying to take the scrape for a target.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The caller must scrape and then call `succeed` or `fail`.
    Acquired,
    /// Someone else is scraping; `wait` for them.
    InFlight,
    AlreadySucceeded,
    /// The last scrape failed; only a manual retry may take it again.
    PreviouslyFailed(CatalogError),
}

/// Per-session record of scrapes fired by auto-scrape controllers, keyed by target.
#[derive(Debug, Default)]
pub struct ScrapeRegistry {
    guards: Mutex<HashMap<ScrapeTarget, Guard>>,
    settled: Notify,
}

impl ScrapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, target: ScrapeTarget) -> Claim {
        let mut guards = lock_or_recover(&self.guards, SOURCE, "claim");
        match guards.get(&target) {
            None => {
                guards.insert(target, Guard::InFlight);
                Claim::Acquired
            }
            Some(Guard::InFlight) => Claim::InFlight,
            Some(Guard::Succeeded) => Claim::AlreadySucceeded,
            Some(Guard::Failed(error)) => Claim::PreviouslyFailed(error.clone()),
        }
    }

    /// Take the scrape for a manual retry: allowed unless one is already in flight.
    pub fn claim_retry(&self, target: ScrapeTarget) -> Claim {
        let mut guards = lock_or_recover(&self.guards, SOURCE, "claim_retry");
        if guards.get(&target) == Some(&Guard::InFlight) {
            return Claim::InFlight;
        }
        guards.insert(target, Guard::InFlight);
        Claim::Acquired
    }

    pub fn succeed(&self, target: ScrapeTarget) {
        self.settle(target, Guard::Succeeded);
    }

    pub fn fail(&self, target: ScrapeTarget, error: CatalogError) {
        self.settle(target, Guard::Failed(error));
    }

    /// Wait until no scrape for `target` is in flight.
    pub async fn wait(&self, target: ScrapeTarget) {
        loop {
            let notified = self.settled.notified();
            if !self.is_in_flight(target) {
                return;
            }
            notified.await;
        }
    }

    pub fn is_in_flight(&self, target: ScrapeTarget) -> bool {
        lock_or_recover(&self.guards, SOURCE, "is_in_flight").get(&target) == Some(&Guard::InFlight)
    }

    /// Error of the last scrape for `target`, if it failed.
    pub fn last_failure(&self, target: ScrapeTarget) -> Option<CatalogError> {
        match lock_or_recover(&self.guards, SOURCE, "last_failure").get(&target) {
            Some(Guard::Failed(error)) => Some(error.clone()),
            _ => None,
        }
    }

    fn settle(&self, target: ScrapeTarget, guard: Guard) {
        lock_or_recover(&self.guards, SOURCE, "settle").insert(target, guard);
        self.settled.notify_waiters();
    }
}

/// An acquired claim. Dropping it unsettled (the controller's future was abandoned) records
/// a failure, so waiting controllers are released and a manual retry can take the target.
struct HeldClaim<'a> {
    registry: &'a ScrapeRegistry,
    target: ScrapeTarget,
    settled: bool,
}

impl<'a> HeldClaim<'a> {
    fn new(registry: &'a ScrapeRegistry, target: ScrapeTarget) -> Self {
        Self {
            registry,
            target,
            settled: false,
        }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.registry.succeed(self.target);
    }

    fn fail(mut self, error: CatalogError) {
        self.settled = true;
        self.registry.fail(self.target, error);
    }
}

impl Drop for HeldClaim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(
                scrape_target = %self.target,
                "Auto-scrape abandoned while holding the claim"
            );
            self.registry.fail(
                self.target,
                CatalogError::transport("trigger_scrape", "scrape abandoned before completion"),
            );
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Drives the empty -> scrape -> refetch -> settled lifecycle for one target.
///
/// State changes are published on a `watch` channel; views observe it through `subscribe`
/// instead of owning the controller, so the controller outlives any one view.
pub struct AutoScrapeController {
    catalog: Arc<CatalogService>,
    target: ScrapeTarget,
    source_url: Url,
    max_auto_retries: u32,
    state: watch::Sender<ScrapeState>,
}

impl AutoScrapeController {
    pub fn new(catalog: Arc<CatalogService>, target: ScrapeTarget) -> Self {
        let settings = catalog.settings();
        let source_url = settings.default_source_url.clone();
        let max_auto_retries = settings.max_auto_retries;
        Self {
            catalog,
            target,
            source_url,
            max_auto_retries,
            state: watch::Sender::new(ScrapeState::Idle),
        }
    }

    pub fn with_source_url(mut self, source_url: Url) -> Self {
        self.source_url = source_url;
        self
    }

    pub fn target(&self) -> ScrapeTarget {
        self.target
    }

    pub fn state(&self) -> ScrapeState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScrapeState> {
        self.state.subscribe()
    }

    /// Run the controller in a background task.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<Result<ScrapeState, CatalogError>> {
        tokio::spawn(async move { self.run().await })
    }

    /// Observe navigation and drive the state machine to a terminal state.
    ///
    /// A failing navigation query is returned as an error and leaves the controller `Idle`.
    /// Calling `run` on a controller that already finished returns its terminal state.
    #[instrument(skip_all, fields(target = %self.target))]
    pub async fn run(&self) -> Result<ScrapeState, CatalogError> {
        let current = self.state();
        if current.is_terminal() {
            return Ok(current);
        }

        let navigation = self.catalog.navigation(QueryOptions::default()).await?;
        self.transition(ScrapeState::Checking);
        if !is_catalog_empty(&navigation) {
            return Ok(self.settle(Settlement::Populated));
        }

        let registry = Arc::clone(self.catalog.scrapes());
        match registry.claim(self.target) {
            Claim::Acquired => self.scrape_until_settled().await,
            Claim::InFlight => {
                debug!("Scrape already in flight; waiting for it");
                registry.wait(self.target).await;
                self.after_foreign_scrape().await
            }
            Claim::AlreadySucceeded => {
                debug!("Target already scraped this session; re-checking navigation");
                self.after_foreign_scrape().await
            }
            Claim::PreviouslyFailed(error) => Ok(self.transition(ScrapeState::Failed { error })),
        }
    }

    /// Manual retry from `Failed`. In any other state, returns the current state unchanged.
    #[instrument(skip_all, fields(target = %self.target))]
    pub async fn retry(&self) -> Result<ScrapeState, CatalogError> {
        let current = self.state();
        if !matches!(current, ScrapeState::Failed { .. }) {
            return Ok(current);
        }

        info!("Manual retry requested");
        self.transition(ScrapeState::Idle);
        match self.catalog.scrapes().claim_retry(self.target) {
            Claim::Acquired => self.scrape_until_settled().await,
            _ => {
                self.catalog.scrapes().wait(self.target).await;
                self.after_foreign_scrape().await
            }
        }
    }

    async fn scrape_until_settled(&self) -> Result<ScrapeState, CatalogError> {
        let claim = HeldClaim::new(self.catalog.scrapes(), self.target);
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.transition(ScrapeState::Scraping { attempt });
            counter!(METRIC_AUTO_SCRAPE_FIRED).increment(1);
            if let Err(error) = self
                .catalog
                .trigger_scrape(self.target, Some(&self.source_url))
                .await
            {
                warn!(attempt, error = %error, "Auto-scrape failed");
                claim.fail(error.clone());
                return Ok(self.transition(ScrapeState::Failed { error }));
            }

            self.transition(ScrapeState::Recovering { attempt });
            let navigation = match self.catalog.navigation(QueryOptions::default()).await {
                Ok(navigation) => navigation,
                Err(error) => {
                    claim.succeed();
                    warn!(error = %error, "Navigation refetch after scrape failed");
                    return Ok(self.transition(ScrapeState::Failed { error }));
                }
            };
            if !is_catalog_empty(&navigation) {
                claim.succeed();
                return Ok(self.settle(Settlement::Populated));
            }
            if attempt > self.max_auto_retries {
                claim.succeed();
                return Ok(self.settle(Settlement::NoDataAvailable));
            }
            info!(attempt, "Navigation still empty after scrape; retrying");
        }
    }

    /// Another controller ran the scrape; adopt its outcome.
    async fn after_foreign_scrape(&self) -> Result<ScrapeState, CatalogError> {
        if let Some(error) = self.catalog.scrapes().last_failure(self.target) {
            return Ok(self.transition(ScrapeState::Failed { error }));
        }
        self.transition(ScrapeState::Recovering { attempt: 0 });
        let navigation = self.catalog.navigation(QueryOptions::default()).await?;
        if is_catalog_empty(&navigation) {
            Ok(self.settle(Settlement::NoDataAvailable))
        } else {
            Ok(self.settle(Settlement::Populated))
        }
    }

    fn settle(&self, settlement: Settlement) -> ScrapeState {
        self.transition(ScrapeState::Settled(settlement))
    }

    fn transition(&self, next: ScrapeState) -> ScrapeState {
        let previous = self.state.send_replace(next.clone());
        if previous != next {
            info!(from = %previous, to = %next, "Auto-scrape state changed");
        }
        next
    }
}

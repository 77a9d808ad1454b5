//! Typed catalog facade over the query cache.
//!
//! Every read resolves a logical request to a `CacheKey` and goes through the shared
//! `QueryCoordinator`; every write goes through the `MutationCoordinator` with the invalidation
//! plan of its `MutationKind`.

use std::num::NonZeroU32;
use std::sync::Arc;

use futures::future::join_all;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::application::auto_scrape::ScrapeRegistry;
use crate::application::error::CatalogError;
use crate::application::pagination::{PageAccumulator, PageRequest, PageWindow, ProductPage};
use crate::application::remote::CatalogRemote;
use crate::cache::{
    CacheConfig, CacheEntry, CacheKey, EntityStore, InvalidationPlan, MutationCoordinator,
    MutationKind, QueryCoordinator, QueryOptions, QuerySnapshot, QueryStatus, Subscription,
};
use crate::config::{DEFAULT_MAX_AUTO_RETRIES, DEFAULT_PAGE_SIZE, Settings};
use crate::domain::auth::Credential;
use crate::domain::error::DomainError;
use crate::domain::favourites::{FavouriteAck, contains_product};
use crate::domain::navigation;
use crate::domain::reviews::NewReview;
use crate::domain::{
    Category, CategoryId, FavouriteEdge, NavigationTree, Product, ProductDetail, ProductId,
    Review, ScrapeOutcome, ScrapeTarget,
};

/// A cached query result. Payloads are shared read-only snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogPayload {
    Navigation(Arc<Vec<NavigationTree>>),
    Categories(Arc<Vec<Category>>),
    /// A category listing page or a search results page.
    Products(Arc<ProductPage>),
    Product(Arc<ProductDetail>),
    Related(Arc<Vec<Product>>),
    Favourites(Arc<Vec<FavouriteEdge>>),
    Reviews(Arc<Vec<Review>>),
}

macro_rules! payload_accessor {
    ($method:ident, $variant:ident, $ty:ty) => {
        pub fn $method(self, key: &CacheKey) -> Result<Arc<$ty>, CatalogError> {
            match self {
                Self::$variant(value) => Ok(value),
                _ => Err(CatalogError::PayloadMismatch {
                    key: key.to_string(),
                }),
            }
        }
    };
}

impl CatalogPayload {
    payload_accessor!(into_navigation, Navigation, Vec<NavigationTree>);
    payload_accessor!(into_categories, Categories, Vec<Category>);
    payload_accessor!(into_products, Products, ProductPage);
    payload_accessor!(into_product, Product, ProductDetail);
    payload_accessor!(into_related, Related, Vec<Product>);
    payload_accessor!(into_favourites, Favourites, Vec<FavouriteEdge>);
    payload_accessor!(into_reviews, Reviews, Vec<Review>);
}

pub type CatalogStore = EntityStore<CacheKey, CatalogPayload>;

/// Knobs of the catalog facade, resolved from `Settings` or built directly in tests.
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub cache: CacheConfig,
    pub page_size: NonZeroU32,
    /// Show the previous page while the requested one loads.
    pub keep_previous_page: bool,
    pub default_source_url: Url,
    pub max_auto_retries: u32,
}

impl CatalogSettings {
    /// Defaults for everything but the scrape source.
    pub fn new(default_source_url: Url) -> Self {
        Self {
            cache: CacheConfig::default(),
            page_size: NonZeroU32::new(DEFAULT_PAGE_SIZE).unwrap_or(NonZeroU32::MIN),
            keep_previous_page: false,
            default_source_url,
            max_auto_retries: DEFAULT_MAX_AUTO_RETRIES,
        }
    }
}

impl From<&Settings> for CatalogSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            cache: CacheConfig::from(&settings.cache),
            page_size: settings.pagination.page_size,
            keep_previous_page: settings.pagination.keep_previous_page,
            default_source_url: settings.scrape.default_source_url.clone(),
            max_auto_retries: settings.scrape.max_auto_retries,
        }
    }
}

/// Catalog reads and writes for one session.
pub struct CatalogService {
    remote: Arc<dyn CatalogRemote>,
    store: Arc<CatalogStore>,
    queries: QueryCoordinator<CacheKey, CatalogPayload>,
    mutations: MutationCoordinator<CacheKey, CatalogPayload>,
    scrapes: Arc<ScrapeRegistry>,
    settings: CatalogSettings,
}

impl CatalogService {
    pub fn new(remote: Arc<dyn CatalogRemote>, settings: CatalogSettings) -> Self {
        let store = Arc::new(EntityStore::new(&settings.cache));
        Self {
            remote,
            queries: QueryCoordinator::new(Arc::clone(&store), settings.cache.stale_after),
            mutations: MutationCoordinator::new(Arc::clone(&store)),
            store,
            scrapes: Arc::new(ScrapeRegistry::new()),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<CatalogStore> {
        &self.store
    }

    pub fn scrapes(&self) -> &Arc<ScrapeRegistry> {
        &self.scrapes
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    pub fn entry(&self, key: &CacheKey) -> CacheEntry<CacheKey, CatalogPayload> {
        self.store.get(key)
    }

    pub fn subscribe<F>(&self, key: &CacheKey, callback: F) -> Subscription
    where
        F: Fn(&CacheEntry<CacheKey, CatalogPayload>) + Send + Sync + 'static,
    {
        self.store.subscribe(key, callback)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Resolve any catalog key. `credential` is only sent for favourites and reviews.
    pub async fn query(
        &self,
        key: &CacheKey,
        options: QueryOptions,
        credential: Option<&Credential>,
    ) -> Result<CatalogPayload, CatalogError> {
        self.queries
            .query(key, options, || self.load(key, credential))
            .await
    }

    /// Navigation groups, normalised to a two-level category forest.
    pub async fn navigation(
        &self,
        options: QueryOptions,
    ) -> Result<Arc<Vec<NavigationTree>>, CatalogError> {
        let key = CacheKey::Navigation;
        self.query(&key, options, None).await?.into_navigation(&key)
    }

    pub async fn navigation_categories(
        &self,
        slug: &str,
        options: QueryOptions,
    ) -> Result<Arc<Vec<Category>>, CatalogError> {
        let slug = slug.trim();
        if slug.is_empty() {
            return Err(DomainError::validation("navigation slug must not be empty").into());
        }
        let key = CacheKey::navigation_categories(slug);
        self.query(&key, options, None).await?.into_categories(&key)
    }

    /// One page of a category listing, `page` 1-based, sized by `pagination.page_size`.
    pub async fn category_products(
        &self,
        category_id: CategoryId,
        page: u32,
        options: QueryOptions,
    ) -> Result<PageWindow<Product>, CatalogError> {
        let request = PageRequest::new(page, self.settings.page_size.get())?;
        self.category_page(category_id, request, options).await
    }

    /// What a listing view shows for `page` right now. With `keep_previous_page`, a page that
    /// is still loading shows the previous page's items, flagged as a placeholder.
    pub fn category_snapshot(
        &self,
        category_id: CategoryId,
        page: u32,
    ) -> QuerySnapshot<CatalogPayload> {
        let limit = self.settings.page_size.get();
        let key = CacheKey::category_products(category_id, page, limit);
        let previous = (self.settings.keep_previous_page && page > 1)
            .then(|| CacheKey::category_products(category_id, page - 1, limit));
        self.queries.snapshot(&key, previous.as_ref())
    }

    /// Load the page after the last one in `accumulator`. Returns `None` once the listing
    /// reports no further page. If any accumulated page was invalidated or refetched since it
    /// was read, the accumulator is reset and loading restarts at page 1.
    pub async fn load_more(
        &self,
        category_id: CategoryId,
        accumulator: &mut PageAccumulator,
    ) -> Result<Option<PageWindow<Product>>, CatalogError> {
        let limit = self.settings.page_size;
        let outdated = accumulator.generations().any(|(page, generation)| {
            let entry = self
                .store
                .get(&CacheKey::category_products(category_id, page, limit.get()));
            // An evicted page has nothing to compare against.
            entry.status != QueryStatus::Idle && (entry.stale || entry.generation != generation)
        });
        if outdated {
            debug!(category_id = %category_id, "Listing changed; restarting from page 1");
            accumulator.reset();
        }

        let Some(request) = accumulator.next_request(limit) else {
            return Ok(None);
        };
        let window = self
            .category_page(category_id, request, QueryOptions::default())
            .await?;
        let key = CacheKey::category_products(category_id, request.page.get(), request.limit.get());
        accumulator.insert(&window, self.store.get(&key).generation);
        Ok(Some(window))
    }

    pub async fn product(
        &self,
        id: &ProductId,
        options: QueryOptions,
    ) -> Result<Arc<ProductDetail>, CatalogError> {
        let key = CacheKey::Product(id.clone());
        self.query(&key, options, None).await?.into_product(&key)
    }

    pub async fn related_products(
        &self,
        id: &ProductId,
        options: QueryOptions,
    ) -> Result<Arc<Vec<Product>>, CatalogError> {
        let key = CacheKey::RelatedProducts(id.clone());
        self.query(&key, options, None).await?.into_related(&key)
    }

    /// Search results. Blank queries are rejected before any request is made.
    pub async fn search(
        &self,
        query: &str,
        page: u32,
        options: QueryOptions,
    ) -> Result<PageWindow<Product>, CatalogError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DomainError::validation("search query must not be empty").into());
        }
        let request = PageRequest::new(page, self.settings.page_size.get())?;
        let key = CacheKey::Search {
            query: query.to_string(),
            page: request.page.get(),
            limit: request.limit.get(),
        };
        let page = self.query(&key, options, None).await?.into_products(&key)?;
        Ok(PageWindow::from_page(&request, &page))
    }

    pub async fn favourites(
        &self,
        credential: Option<&Credential>,
        options: QueryOptions,
    ) -> Result<Arc<Vec<FavouriteEdge>>, CatalogError> {
        let key = CacheKey::Favourites;
        self.query(&key, options, credential)
            .await?
            .into_favourites(&key)
    }

    pub async fn reviews(
        &self,
        product_id: &ProductId,
        credential: Option<&Credential>,
        options: QueryOptions,
    ) -> Result<Arc<Vec<Review>>, CatalogError> {
        let key = CacheKey::Reviews(product_id.clone());
        self.query(&key, options, credential)
            .await?
            .into_reviews(&key)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Favourite a product. A product already in the fresh cached favourites list
    /// short-circuits without a request.
    #[instrument(skip_all, fields(product_id = %product_id))]
    pub async fn add_favourite(
        &self,
        product_id: &ProductId,
        credential: Option<&Credential>,
    ) -> Result<FavouriteAck, CatalogError> {
        let cached = self.store.get(&CacheKey::Favourites);
        let fresh = cached.is_fresh(self.settings.cache.stale_after, OffsetDateTime::now_utc());
        if fresh
            && let Some(CatalogPayload::Favourites(edges)) = cached.value
            && contains_product(&edges, product_id)
        {
            info!("Product already favourited");
            return Ok(FavouriteAck::AlreadyPresent);
        }

        let kind = MutationKind::AddFavourite {
            product_id: product_id.clone(),
        };
        let plan = InvalidationPlan::for_mutation(&kind);
        let outcome = self
            .mutations
            .mutate(
                kind.name(),
                self.remote.add_favourite(product_id, credential),
                &plan.targets,
            )
            .await?;
        self.refetch_active(&outcome.invalidated, credential).await;
        Ok(FavouriteAck::Added)
    }

    /// Submit a review. The rating is checked (1..=5) before any request is made.
    #[instrument(skip_all, fields(product_id = %product_id, rating = rating))]
    pub async fn add_review(
        &self,
        product_id: &ProductId,
        rating: i64,
        comment: Option<String>,
        credential: Option<&Credential>,
    ) -> Result<Review, CatalogError> {
        let review = NewReview::new(rating, comment)?;
        let request = review.to_request();

        let kind = MutationKind::AddReview {
            product_id: product_id.clone(),
        };
        let plan = InvalidationPlan::for_mutation(&kind);
        let outcome = self
            .mutations
            .mutate(
                kind.name(),
                self.remote.add_review(product_id, &request, credential),
                &plan.targets,
            )
            .await?;
        self.refetch_active(&outcome.invalidated, credential).await;
        Ok(outcome.value)
    }

    /// Ask the remote to re-ingest `target` from `source_url` (default:
    /// `scrape.default_source_url`).
    #[instrument(skip_all, fields(target = %target))]
    pub async fn trigger_scrape(
        &self,
        target: ScrapeTarget,
        source_url: Option<&Url>,
    ) -> Result<ScrapeOutcome, CatalogError> {
        let source_url = source_url.unwrap_or(&self.settings.default_source_url);
        let kind = MutationKind::TriggerScrape { target };
        let plan = InvalidationPlan::for_mutation(&kind);
        info!(source_url = %source_url, plan = %plan, "Triggering scrape");

        let outcome = self
            .mutations
            .mutate(
                kind.name(),
                self.remote.trigger_scrape(target, source_url),
                &plan.targets,
            )
            .await?;
        info!(
            ingested = outcome.value.len(),
            invalidated = outcome.invalidated.len(),
            "Scrape finished"
        );
        self.refetch_active(&outcome.invalidated, None).await;
        Ok(outcome.value)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn category_page(
        &self,
        category_id: CategoryId,
        request: PageRequest,
        options: QueryOptions,
    ) -> Result<PageWindow<Product>, CatalogError> {
        let key = CacheKey::category_products(category_id, request.page.get(), request.limit.get());
        let page = self.query(&key, options, None).await?.into_products(&key)?;
        Ok(PageWindow::from_page(&request, &page))
    }

    async fn load(
        &self,
        key: &CacheKey,
        credential: Option<&Credential>,
    ) -> Result<CatalogPayload, CatalogError> {
        let remote = &self.remote;
        let payload = match key {
            CacheKey::Navigation => CatalogPayload::Navigation(Arc::new(navigation::normalize(
                remote.fetch_navigation().await?,
            ))),
            CacheKey::NavigationCategories { slug } => {
                CatalogPayload::Categories(Arc::new(remote.fetch_navigation_categories(slug).await?))
            }
            CacheKey::CategoryProducts {
                category_id,
                page,
                limit,
            } => {
                let request = PageRequest::new(*page, *limit)?;
                CatalogPayload::Products(Arc::new(
                    remote.fetch_category_products(*category_id, request).await?,
                ))
            }
            CacheKey::Product(id) => CatalogPayload::Product(Arc::new(remote.fetch_product(id).await?)),
            CacheKey::RelatedProducts(id) => {
                CatalogPayload::Related(Arc::new(remote.fetch_related_products(id).await?))
            }
            CacheKey::Search { query, page, limit } => {
                let request = PageRequest::new(*page, *limit)?;
                CatalogPayload::Products(Arc::new(remote.search_products(query, request).await?))
            }
            CacheKey::Favourites => {
                CatalogPayload::Favourites(Arc::new(remote.list_favourites(credential).await?))
            }
            CacheKey::Reviews(id) => {
                CatalogPayload::Reviews(Arc::new(remote.list_reviews(id, credential).await?))
            }
        };
        Ok(payload)
    }

    /// Refetch invalidated keys that a view is still subscribed to. Failures stay on their
    /// entries; the mutation has already succeeded.
    async fn refetch_active(&self, invalidated: &[CacheKey], credential: Option<&Credential>) {
        if !self.settings.cache.refetch_active_on_invalidate {
            return;
        }
        let active: Vec<&CacheKey> = invalidated
            .iter()
            .filter(|key| self.store.subscriber_count(key) > 0)
            .collect();
        if active.is_empty() {
            return;
        }

        debug!(count = active.len(), "Refetching active queries");
        let results = join_all(
            active
                .iter()
                .map(|key| self.query(key, QueryOptions::default(), credential)),
        )
        .await;
        for (key, result) in active.iter().zip(results) {
            if let Err(error) = result {
                warn!(key = %key, error = %error, "Refetch after invalidation failed");
            }
        }
    }
}

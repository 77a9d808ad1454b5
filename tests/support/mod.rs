#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use folio::application::catalog::{CatalogService, CatalogSettings};
use folio::application::error::CatalogError;
use folio::application::pagination::{PageRequest, ProductPage};
use folio::application::remote::CatalogRemote;
use folio::domain::auth::Credential;
use folio::domain::{
    Category, CategoryId, FavouriteEdge, FavouriteId, NavigationId, NavigationTree, Product,
    ProductDetail, ProductId, Review, ReviewId, ScrapeOutcome, ScrapeTarget, UserId,
};
use folio_api_types::ReviewRequest;
use time::OffsetDateTime;
use tokio::sync::oneshot;
use url::Url;

pub const SOURCE_URL: &str = "https://books.example/fiction";

/// What the fake does when a scrape is triggered.
#[derive(Debug, Clone)]
pub enum ScrapeEffect {
    /// Replace the navigation the fake serves and, for a category scrape, its products.
    Populate {
        navigation: Vec<NavigationTree>,
        products: Vec<Product>,
    },
    /// Succeed without ingesting anything.
    Nothing,
    Fail(CatalogError),
}

/// In-memory catalog API with call counters and gates for holding responses back.
#[derive(Default)]
pub struct FakeRemote {
    calls: Mutex<HashMap<&'static str, usize>>,
    gates: Mutex<HashMap<&'static str, VecDeque<oneshot::Receiver<()>>>>,
    navigation: Mutex<Vec<NavigationTree>>,
    navigation_failures: Mutex<VecDeque<CatalogError>>,
    products: Mutex<HashMap<CategoryId, Vec<Product>>>,
    report_totals: Mutex<bool>,
    scrape_effects: Mutex<VecDeque<ScrapeEffect>>,
    favourites: Mutex<Vec<FavouriteEdge>>,
    favourite_failure: Mutex<Option<CatalogError>>,
    reviews: Mutex<HashMap<ProductId, Vec<Review>>>,
    tokens: Mutex<Vec<Option<String>>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Poll until `op` has been called at least `count` times.
    pub async fn wait_for_calls(&self, op: &str, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.calls(op) < count {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("`{op}` was not called {count} times"));
    }

    /// Hold the next not-yet-started call of `op` until the returned sender fires.
    pub fn gate(&self, op: &'static str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(rx);
        tx
    }

    pub fn set_navigation(&self, trees: Vec<NavigationTree>) {
        *self.navigation.lock().unwrap() = trees;
    }

    pub fn fail_next_navigation(&self, error: CatalogError) {
        self.navigation_failures.lock().unwrap().push_back(error);
    }

    pub fn set_products(&self, category_id: CategoryId, products: Vec<Product>) {
        self.products.lock().unwrap().insert(category_id, products);
    }

    pub fn report_totals(&self, enabled: bool) {
        *self.report_totals.lock().unwrap() = enabled;
    }

    pub fn push_scrape_effect(&self, effect: ScrapeEffect) {
        self.scrape_effects.lock().unwrap().push_back(effect);
    }

    pub fn fail_next_favourite(&self, error: CatalogError) {
        *self.favourite_failure.lock().unwrap() = Some(error);
    }

    pub fn set_favourites(&self, edges: Vec<FavouriteEdge>) {
        *self.favourites.lock().unwrap() = edges;
    }

    pub fn set_reviews(&self, product_id: &ProductId, reviews: Vec<Review>) {
        self.reviews
            .lock()
            .unwrap()
            .insert(product_id.clone(), reviews);
    }

    /// Tokens seen by authenticated calls, in call order.
    pub fn tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().unwrap().clone()
    }

    /// Count the call and take its gate, if any. The gate is awaited by `pass`.
    fn enter(&self, op: &'static str) -> Option<oneshot::Receiver<()>> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
        self.gates
            .lock()
            .unwrap()
            .get_mut(op)
            .and_then(VecDeque::pop_front)
    }

    fn record_token(&self, credential: Option<&Credential>) {
        self.tokens
            .lock()
            .unwrap()
            .push(credential.map(|c| c.token().to_string()));
    }

    fn page_of(&self, items: Vec<Product>, page: PageRequest) -> ProductPage {
        let total = items.len() as u64;
        let slice: Vec<Product> = items
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit.get() as usize)
            .collect();
        if *self.report_totals.lock().unwrap() {
            ProductPage::with_total(slice, total)
        } else {
            ProductPage::new(slice)
        }
    }
}

async fn pass(gate: Option<oneshot::Receiver<()>>) {
    if let Some(gate) = gate {
        let _ = gate.await;
    }
}

#[async_trait]
impl CatalogRemote for FakeRemote {
    async fn fetch_navigation(&self) -> Result<Vec<NavigationTree>, CatalogError> {
        let gate = self.enter("fetch_navigation");
        let failure = self.navigation_failures.lock().unwrap().pop_front();
        let snapshot = self.navigation.lock().unwrap().clone();
        pass(gate).await;
        match failure {
            Some(error) => Err(error),
            None => Ok(snapshot),
        }
    }

    async fn fetch_navigation_categories(
        &self,
        slug: &str,
    ) -> Result<Vec<Category>, CatalogError> {
        let gate = self.enter("fetch_navigation_categories");
        let categories = self
            .navigation
            .lock()
            .unwrap()
            .iter()
            .find(|tree| tree.slug == slug)
            .map(|tree| tree.categories.clone())
            .unwrap_or_default();
        pass(gate).await;
        Ok(categories)
    }

    async fn fetch_category_products(
        &self,
        category_id: CategoryId,
        page: PageRequest,
    ) -> Result<ProductPage, CatalogError> {
        let gate = self.enter("fetch_category_products");
        let items = self
            .products
            .lock()
            .unwrap()
            .get(&category_id)
            .cloned()
            .unwrap_or_default();
        let result = self.page_of(items, page);
        pass(gate).await;
        Ok(result)
    }

    async fn fetch_product(&self, id: &ProductId) -> Result<ProductDetail, CatalogError> {
        let gate = self.enter("fetch_product");
        let found = self
            .products
            .lock()
            .unwrap()
            .values()
            .flatten()
            .find(|product| &product.id == id)
            .cloned();
        let reviews = self
            .reviews
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default();
        pass(gate).await;
        found
            .map(|product| ProductDetail {
                product,
                details: None,
                reviews,
            })
            .ok_or_else(|| CatalogError::transport("fetch_product", "status 404"))
    }

    async fn fetch_related_products(&self, id: &ProductId) -> Result<Vec<Product>, CatalogError> {
        let gate = self.enter("fetch_related_products");
        let related = self
            .products
            .lock()
            .unwrap()
            .values()
            .find(|items| items.iter().any(|product| &product.id == id))
            .map(|items| {
                items
                    .iter()
                    .filter(|product| &product.id != id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        pass(gate).await;
        Ok(related)
    }

    async fn search_products(
        &self,
        query: &str,
        page: PageRequest,
    ) -> Result<ProductPage, CatalogError> {
        let gate = self.enter("search_products");
        let needle = query.to_lowercase();
        let matches: Vec<Product> = self
            .products
            .lock()
            .unwrap()
            .values()
            .flatten()
            .filter(|product| product.title.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        let result = self.page_of(matches, page);
        pass(gate).await;
        Ok(result)
    }

    async fn trigger_scrape(
        &self,
        target: ScrapeTarget,
        _source_url: &Url,
    ) -> Result<ScrapeOutcome, CatalogError> {
        let gate = self.enter("trigger_scrape");
        pass(gate).await;
        let effect = self
            .scrape_effects
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScrapeEffect::Nothing);
        match (effect, target) {
            (ScrapeEffect::Fail(error), _) => Err(error),
            (ScrapeEffect::Populate { navigation, .. }, ScrapeTarget::Navigation) => {
                self.set_navigation(navigation.clone());
                Ok(ScrapeOutcome::Navigation(navigation))
            }
            (
                ScrapeEffect::Populate {
                    navigation,
                    products,
                },
                ScrapeTarget::Category(category_id),
            ) => {
                self.set_navigation(navigation);
                self.set_products(category_id, products.clone());
                Ok(ScrapeOutcome::Products(products))
            }
            (ScrapeEffect::Nothing, ScrapeTarget::Navigation) => {
                Ok(ScrapeOutcome::Navigation(Vec::new()))
            }
            (ScrapeEffect::Nothing, ScrapeTarget::Category(_)) => {
                Ok(ScrapeOutcome::Products(Vec::new()))
            }
        }
    }

    async fn add_favourite(
        &self,
        product_id: &ProductId,
        credential: Option<&Credential>,
    ) -> Result<(), CatalogError> {
        let gate = self.enter("add_favourite");
        self.record_token(credential);
        pass(gate).await;
        if let Some(error) = self.favourite_failure.lock().unwrap().take() {
            return Err(error);
        }
        let mut favourites = self.favourites.lock().unwrap();
        let id = FavouriteId::new(format!("fav-{}", favourites.len() + 1));
        favourites.push(FavouriteEdge {
            id,
            product_id: product_id.clone(),
            user_id: None,
            product: None,
        });
        Ok(())
    }

    async fn list_favourites(
        &self,
        credential: Option<&Credential>,
    ) -> Result<Vec<FavouriteEdge>, CatalogError> {
        let gate = self.enter("list_favourites");
        self.record_token(credential);
        let favourites = self.favourites.lock().unwrap().clone();
        pass(gate).await;
        Ok(favourites)
    }

    async fn add_review(
        &self,
        product_id: &ProductId,
        review: &ReviewRequest,
        credential: Option<&Credential>,
    ) -> Result<Review, CatalogError> {
        let gate = self.enter("add_review");
        self.record_token(credential);
        pass(gate).await;
        let mut reviews = self.reviews.lock().unwrap();
        let list = reviews.entry(product_id.clone()).or_default();
        let created = Review {
            id: ReviewId::new(format!("r-{}", list.len() + 1)),
            product_id: product_id.clone(),
            user_id: UserId::new("u-1"),
            rating: review.rating,
            comment: review.comment.clone(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        list.push(created.clone());
        Ok(created)
    }

    async fn list_reviews(
        &self,
        product_id: &ProductId,
        credential: Option<&Credential>,
    ) -> Result<Vec<Review>, CatalogError> {
        let gate = self.enter("list_reviews");
        self.record_token(credential);
        let reviews = self
            .reviews
            .lock()
            .unwrap()
            .get(product_id)
            .cloned()
            .unwrap_or_default();
        pass(gate).await;
        Ok(reviews)
    }
}

pub fn settings() -> CatalogSettings {
    CatalogSettings::new(Url::parse(SOURCE_URL).expect("url"))
}

pub fn catalog(remote: &Arc<FakeRemote>) -> Arc<CatalogService> {
    catalog_with(remote, settings())
}

pub fn catalog_with(remote: &Arc<FakeRemote>, settings: CatalogSettings) -> Arc<CatalogService> {
    let remote: Arc<dyn CatalogRemote> = remote.clone();
    Arc::new(CatalogService::new(remote, settings))
}

pub fn product(id: &str, category: i64) -> Product {
    Product {
        id: ProductId::new(id),
        source_id: format!("src-{id}"),
        title: format!("Book {id}"),
        author: Some("A. Writer".to_string()),
        price: Some(5.0),
        currency: "GBP".to_string(),
        image_url: None,
        source_url: Url::parse(&format!("https://books.example/{id}")).expect("url"),
        last_scraped_at: None,
        category_id: CategoryId(category),
    }
}

pub fn products(category: i64, count: usize) -> Vec<Product> {
    (1..=count)
        .map(|n| product(&format!("c{category}-p{n}"), category))
        .collect()
}

pub fn category(id: i64, parent: Option<i64>) -> Category {
    Category {
        id: CategoryId(id),
        title: format!("Category {id}"),
        slug: format!("category-{id}"),
        parent_id: parent.map(CategoryId),
    }
}

pub fn navigation(categories: Vec<Category>) -> Vec<NavigationTree> {
    vec![NavigationTree {
        id: NavigationId(1),
        title: "Books".to_string(),
        slug: "books".to_string(),
        categories,
    }]
}

pub fn empty_navigation() -> Vec<NavigationTree> {
    navigation(Vec::new())
}

pub fn populated_navigation() -> Vec<NavigationTree> {
    navigation(vec![category(1, None), category(2, Some(1))])
}

pub fn populate(products: Vec<Product>) -> ScrapeEffect {
    ScrapeEffect::Populate {
        navigation: populated_navigation(),
        products,
    }
}

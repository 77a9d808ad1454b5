//! The remote catalog collaborator the cache fetches from and writes through.

use async_trait::async_trait;
use url::Url;

use crate::application::error::CatalogError;
use crate::application::pagination::{PageRequest, ProductPage};
use crate::domain::auth::Credential;
use crate::domain::{
    Category, CategoryId, FavouriteEdge, NavigationTree, Product, ProductDetail, ProductId,
    Review, ScrapeOutcome, ScrapeTarget,
};
use folio_api_types::ReviewRequest;

/// Reads and writes against the catalog API.
///
/// Every failure, whatever its cause, is a `CatalogError::Transport`. List-shaped results are
/// never absent: an empty collection comes back as an empty `Vec`. Credentials are passed
/// through untouched; a missing or expired one surfaces as an ordinary failure.
#[async_trait]
pub trait CatalogRemote: Send + Sync {
    async fn fetch_navigation(&self) -> Result<Vec<NavigationTree>, CatalogError>;

    async fn fetch_navigation_categories(&self, slug: &str)
    -> Result<Vec<Category>, CatalogError>;

    async fn fetch_category_products(
        &self,
        category_id: CategoryId,
        page: PageRequest,
    ) -> Result<ProductPage, CatalogError>;

    async fn fetch_product(&self, id: &ProductId) -> Result<ProductDetail, CatalogError>;

    async fn fetch_related_products(&self, id: &ProductId) -> Result<Vec<Product>, CatalogError>;

    async fn search_products(
        &self,
        query: &str,
        page: PageRequest,
    ) -> Result<ProductPage, CatalogError>;

    async fn trigger_scrape(
        &self,
        target: ScrapeTarget,
        source_url: &Url,
    ) -> Result<ScrapeOutcome, CatalogError>;

    async fn add_favourite(
        &self,
        product_id: &ProductId,
        credential: Option<&Credential>,
    ) -> Result<(), CatalogError>;

    async fn list_favourites(
        &self,
        credential: Option<&Credential>,
    ) -> Result<Vec<FavouriteEdge>, CatalogError>;

    async fn add_review(
        &self,
        product_id: &ProductId,
        review: &ReviewRequest,
        credential: Option<&Credential>,
    ) -> Result<Review, CatalogError>;

    async fn list_reviews(
        &self,
        product_id: &ProductId,
        credential: Option<&Credential>,
    ) -> Result<Vec<Review>, CatalogError>;
}

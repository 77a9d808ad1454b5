//! `reqwest` adapter for the catalog API.

use std::time::Instant;

use async_trait::async_trait;
use folio_api_types::{FavouriteRequest, ReviewRequest, ScrapeRequest};
use reqwest::{Client, RequestBuilder, Response, header::AUTHORIZATION};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::application::error::CatalogError;
use crate::application::pagination::{PageRequest, ProductPage};
use crate::application::remote::CatalogRemote;
use crate::config::ApiSettings;
use crate::domain::auth::Credential;
use crate::domain::{
    Category, CategoryId, FavouriteEdge, NavigationTree, Product, ProductDetail, ProductId,
    Review, ScrapeOutcome, ScrapeTarget,
};

use super::error::InfraError;

const SOURCE: &str = "infra::http";
/// Optional response header carrying the full size of a paged listing.
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct HttpCatalogRemote {
    client: Client,
    base: Url,
}

impl HttpCatalogRemote {
    pub fn new(settings: &ApiSettings) -> Result<Self, InfraError> {
        if settings.base_url.cannot_be_a_base() {
            return Err(InfraError::configuration(format!(
                "api.base_url `{}` cannot carry a path",
                settings.base_url
            )));
        }
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            client,
            base: settings.base_url.clone(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("folio/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint<I>(&self, operation: &'static str, segments: I) -> Result<Url, CatalogError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| CatalogError::transport(operation, "base URL cannot carry a path"))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    fn paged_endpoint<I>(
        &self,
        operation: &'static str,
        segments: I,
        extra: Option<(&str, &str)>,
        page: PageRequest,
    ) -> Result<Url, CatalogError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.endpoint(operation, segments)?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some((key, value)) = extra {
                pairs.append_pair(key, value);
            }
            pairs
                .append_pair("page", &page.page.to_string())
                .append_pair("limit", &page.limit.to_string());
        }
        Ok(url)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
        credential: Option<&Credential>,
    ) -> Result<Response, CatalogError> {
        let request = match credential {
            Some(credential) => request.header(AUTHORIZATION, credential.header_value()),
            None => request,
        };

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|err| CatalogError::transport(operation, err.to_string()))?;
        let status = response.status();
        debug!(
            source = SOURCE,
            operation,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Catalog request completed"
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(CatalogError::transport(
                operation,
                format!("status {status} body {body}"),
            ));
        }
        Ok(response)
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: Url,
        credential: Option<&Credential>,
    ) -> Result<Vec<T>, CatalogError> {
        let response = self.send(operation, self.client.get(url), credential).await?;
        let items: Option<Vec<T>> = decode(operation, response).await?;
        Ok(items.unwrap_or_default())
    }

    async fn get_page(&self, operation: &'static str, url: Url) -> Result<ProductPage, CatalogError> {
        let response = self.send(operation, self.client.get(url), None).await?;
        let total = total_count(&response);
        let items: Option<Vec<Product>> = decode(operation, response).await?;
        let items = items.unwrap_or_default();
        Ok(match total {
            Some(total) => ProductPage::with_total(items, total),
            None => ProductPage::new(items),
        })
    }
}

fn total_count(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(TOTAL_COUNT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

async fn decode<T: DeserializeOwned>(
    operation: &'static str,
    response: Response,
) -> Result<T, CatalogError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|err| CatalogError::transport(operation, err.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|err| {
        CatalogError::transport(operation, format!("failed to parse body: {err}"))
    })
}

#[async_trait]
impl CatalogRemote for HttpCatalogRemote {
    async fn fetch_navigation(&self) -> Result<Vec<NavigationTree>, CatalogError> {
        const OP: &str = "fetch_navigation";
        let url = self.endpoint(OP, ["navigation"])?;
        self.get_list(OP, url, None).await
    }

    async fn fetch_navigation_categories(
        &self,
        slug: &str,
    ) -> Result<Vec<Category>, CatalogError> {
        const OP: &str = "fetch_navigation_categories";
        let url = self.endpoint(OP, ["navigation", slug, "categories"])?;
        self.get_list(OP, url, None).await
    }

    async fn fetch_category_products(
        &self,
        category_id: CategoryId,
        page: PageRequest,
    ) -> Result<ProductPage, CatalogError> {
        const OP: &str = "fetch_category_products";
        let id = category_id.to_string();
        let url = self.paged_endpoint(OP, ["categories", id.as_str(), "products"], None, page)?;
        self.get_page(OP, url).await
    }

    async fn fetch_product(&self, id: &ProductId) -> Result<ProductDetail, CatalogError> {
        const OP: &str = "fetch_product";
        let url = self.endpoint(OP, ["products", id.as_str()])?;
        let response = self.send(OP, self.client.get(url), None).await?;
        decode(OP, response).await
    }

    async fn fetch_related_products(&self, id: &ProductId) -> Result<Vec<Product>, CatalogError> {
        const OP: &str = "fetch_related_products";
        let url = self.endpoint(OP, ["products", id.as_str(), "related"])?;
        self.get_list(OP, url, None).await
    }

    async fn search_products(
        &self,
        query: &str,
        page: PageRequest,
    ) -> Result<ProductPage, CatalogError> {
        const OP: &str = "search_products";
        let url = self.paged_endpoint(OP, ["search"], Some(("q", query)), page)?;
        self.get_page(OP, url).await
    }

    async fn trigger_scrape(
        &self,
        target: ScrapeTarget,
        source_url: &Url,
    ) -> Result<ScrapeOutcome, CatalogError> {
        const OP: &str = "trigger_scrape";
        let segment = target.path_segment();
        let url = self.endpoint(OP, ["scrape", segment.as_str()])?;
        let body = ScrapeRequest {
            url: source_url.clone(),
        };
        let response = self
            .send(OP, self.client.post(url).json(&body), None)
            .await?;

        // An empty array is ambiguous for the untagged outcome, so decode by target.
        match target {
            ScrapeTarget::Navigation => {
                let trees: Option<Vec<NavigationTree>> = decode(OP, response).await?;
                Ok(ScrapeOutcome::Navigation(trees.unwrap_or_default()))
            }
            ScrapeTarget::Category(_) => {
                let products: Option<Vec<Product>> = decode(OP, response).await?;
                Ok(ScrapeOutcome::Products(products.unwrap_or_default()))
            }
        }
    }

    async fn add_favourite(
        &self,
        product_id: &ProductId,
        credential: Option<&Credential>,
    ) -> Result<(), CatalogError> {
        const OP: &str = "add_favourite";
        let url = self.endpoint(OP, ["favourites"])?;
        let body = FavouriteRequest {
            product_id: product_id.clone(),
        };
        self.send(OP, self.client.post(url).json(&body), credential)
            .await?;
        Ok(())
    }

    async fn list_favourites(
        &self,
        credential: Option<&Credential>,
    ) -> Result<Vec<FavouriteEdge>, CatalogError> {
        const OP: &str = "list_favourites";
        let url = self.endpoint(OP, ["favourites"])?;
        self.get_list(OP, url, credential).await
    }

    async fn add_review(
        &self,
        product_id: &ProductId,
        review: &ReviewRequest,
        credential: Option<&Credential>,
    ) -> Result<Review, CatalogError> {
        const OP: &str = "add_review";
        let url = self.endpoint(OP, ["products", product_id.as_str(), "reviews"])?;
        let response = self
            .send(OP, self.client.post(url).json(review), credential)
            .await?;
        decode(OP, response).await
    }

    async fn list_reviews(
        &self,
        product_id: &ProductId,
        credential: Option<&Credential>,
    ) -> Result<Vec<Review>, CatalogError> {
        const OP: &str = "list_reviews";
        let url = self.endpoint(OP, ["products", product_id.as_str(), "reviews"])?;
        self.get_list(OP, url, credential).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn remote(base: &str) -> HttpCatalogRemote {
        HttpCatalogRemote::new(&ApiSettings {
            base_url: Url::parse(base).expect("url"),
            timeout: Duration::from_secs(5),
        })
        .expect("client")
    }

    #[test]
    fn endpoints_escape_segments_and_keep_base_path() {
        let remote = remote("http://localhost:3001/catalog/");
        let url = remote
            .endpoint("fetch_product", ["products", "a/b c"])
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "http://localhost:3001/catalog/api/products/a%2Fb%20c"
        );
    }

    #[test]
    fn paged_endpoint_appends_query() {
        let remote = remote("http://localhost:3001");
        let page = PageRequest::new(2, 10).expect("page");
        let url = remote
            .paged_endpoint("search_products", ["search"], Some(("q", "war & peace")), page)
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "http://localhost:3001/api/search?q=war+%26+peace&page=2&limit=10"
        );
    }
}

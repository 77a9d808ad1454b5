//! Wire types shared between the Folio client library and anything that speaks the catalog API.
//!
//! Field names follow the API's camelCase JSON. List-shaped fields that the server may send as
//! `null` or omit altogether decode as empty vectors, so consumers never have to distinguish
//! "absent" from "empty".

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use url::Url;

mod lenient;

pub use lenient::null_as_default;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                lenient::string_or_number(deserializer).map(Self)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a top-level navigation group.
    NavigationId
);
numeric_id!(
    /// Identifier of a category inside a navigation group.
    CategoryId
);
string_id!(
    /// Identifier of a scraped product.
    ProductId
);
string_id!(ReviewId);
string_id!(UserId);
string_id!(FavouriteId);

/// A category node. `parent_id` is `None` for top-level categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
}

/// A navigation group with its categories, in server order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTree {
    pub id: NavigationId,
    pub title: String,
    pub slug: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source_id: String,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_price")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(default)]
    pub image_url: Option<Url>,
    pub source_url: Url,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_scraped_at: Option<OffsetDateTime>,
    pub category_id: CategoryId,
}

/// Optional long-form attributes the product endpoint may attach.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetails {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

/// Response of the single-product endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    #[serde(default)]
    pub details: Option<ProductDetails>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A user -> product favourite edge. The server may embed the product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavouriteEdge {
    pub id: FavouriteId,
    pub product_id: ProductId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub product: Option<Product>,
}

/// Body of `POST /api/products/{id}/reviews`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Body of `POST /api/favourites`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavouriteRequest {
    pub product_id: ProductId,
}

/// Body of `POST /api/scrape/{target}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub url: Url,
}

/// What a scrape returns: freshly ingested products for a category, or a rebuilt navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScrapeOutcome {
    Products(Vec<Product>),
    Navigation(Vec<NavigationTree>),
}

impl ScrapeOutcome {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Products(items) => items.is_empty(),
            Self::Navigation(trees) => trees.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Products(items) => items.len(),
            Self::Navigation(trees) => trees.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_with_null_categories_decodes_empty() {
        let json = r#"[{"id":1,"title":"Books","slug":"books","categories":null},
                       {"id":2,"title":"Kids","slug":"kids"}]"#;
        let trees: Vec<NavigationTree> = serde_json::from_str(json).expect("decode");
        assert!(trees.iter().all(|tree| tree.categories.is_empty()));
    }

    #[test]
    fn product_accepts_string_price_and_numeric_id() {
        let json = r#"{"id":42,"title":"Dune","price":"7.99","currency":"GBP",
                       "sourceUrl":"https://example.com/dune","categoryId":3}"#;
        let product: Product = serde_json::from_str(json).expect("decode");
        assert_eq!(product.id.as_str(), "42");
        assert_eq!(product.price, Some(7.99));
        assert_eq!(product.category_id, CategoryId(3));
        assert!(product.source_id.is_empty());
        assert!(product.last_scraped_at.is_none());
    }

    #[test]
    fn product_detail_flattens_product_fields() {
        let json = r#"{"id":"p1","title":"Emma","currency":"GBP","price":null,
                       "sourceUrl":"https://example.com/emma","categoryId":1,
                       "details":{"isbn":"978-0"},"reviews":null}"#;
        let detail: ProductDetail = serde_json::from_str(json).expect("decode");
        assert_eq!(detail.product.title, "Emma");
        assert_eq!(detail.product.price, None);
        assert_eq!(
            detail.details.and_then(|d| d.isbn).as_deref(),
            Some("978-0")
        );
        assert!(detail.reviews.is_empty());
    }

    #[test]
    fn scrape_outcome_distinguishes_products_from_navigation() {
        let products: ScrapeOutcome = serde_json::from_str(
            r#"[{"id":"p","title":"T","currency":"GBP","sourceUrl":"https://e.x/p","categoryId":1}]"#,
        )
        .expect("decode products");
        assert!(matches!(products, ScrapeOutcome::Products(ref items) if items.len() == 1));

        let navigation: ScrapeOutcome =
            serde_json::from_str(r#"[{"id":1,"title":"Books","slug":"books","categories":[]}]"#)
                .expect("decode navigation");
        assert!(matches!(navigation, ScrapeOutcome::Navigation(_)));
    }

    #[test]
    fn review_request_omits_missing_comment() {
        let body = serde_json::to_value(ReviewRequest {
            rating: 4,
            comment: None,
        })
        .expect("encode");
        assert_eq!(body, serde_json::json!({ "rating": 4 }));
    }
}

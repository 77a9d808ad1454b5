//! Cache key definitions.
//!
//! `CacheKey` is the identity of one cached query. `Invalidation` names a set of keys that a
//! mutation makes untrustworthy; it is expanded against the keys actually present in the store.

use std::fmt;
use std::hash::Hash;

use crate::domain::{CategoryId, ProductId};

/// Bounds every store key satisfies.
pub trait StoreKey: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> StoreKey for T where T: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{}

/// Chooses which cached keys an invalidation applies to.
pub trait KeySelector<K> {
    fn selects(&self, key: &K) -> bool;
}

impl<K: Eq> KeySelector<K> for K {
    fn selects(&self, key: &K) -> bool {
        self == key
    }
}

/// Identity of a cached query. Equal iff kind and every parameter are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    /// All navigation groups with their categories.
    Navigation,
    /// Categories of one navigation group, by navigation slug.
    NavigationCategories { slug: String },
    /// One page of a category listing. `page` is 1-based.
    CategoryProducts {
        category_id: CategoryId,
        page: u32,
        limit: u32,
    },
    Product(ProductId),
    RelatedProducts(ProductId),
    Search { query: String, page: u32, limit: u32 },
    /// Favourites of the session's user.
    Favourites,
    Reviews(ProductId),
}

impl CacheKey {
    /// Entity kind, used as a metrics label and as the first segment of the display form.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Navigation => "navigation",
            Self::NavigationCategories { .. } => "navigation-categories",
            Self::CategoryProducts { .. } => "category-products",
            Self::Product(_) => "product",
            Self::RelatedProducts(_) => "related-products",
            Self::Search { .. } => "search",
            Self::Favourites => "favourites",
            Self::Reviews(_) => "reviews",
        }
    }

    pub fn category_products(category_id: CategoryId, page: u32, limit: u32) -> Self {
        Self::CategoryProducts {
            category_id,
            page,
            limit,
        }
    }

    pub fn navigation_categories(slug: impl Into<String>) -> Self {
        Self::NavigationCategories { slug: slug.into() }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigation | Self::Favourites => f.write_str(self.kind()),
            Self::NavigationCategories { slug } => write!(f, "{}:{slug}", self.kind()),
            Self::CategoryProducts {
                category_id,
                page,
                limit,
            } => write!(f, "{}:{category_id}:{page}:{limit}", self.kind()),
            Self::Product(id) | Self::RelatedProducts(id) | Self::Reviews(id) => {
                write!(f, "{}:{id}", self.kind())
            }
            Self::Search { query, page, limit } => {
                write!(f, "{}:{query:?}:{page}:{limit}", self.kind())
            }
        }
    }
}

/// A set of keys made untrustworthy by a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Invalidation {
    Key(CacheKey),
    /// Every cached page (any page, any limit) of one category.
    CategoryPages(CategoryId),
    /// Every cached page of every category.
    AllCategoryPages,
    /// Every cached navigation-categories entry.
    AllNavigationCategories,
}

impl KeySelector<CacheKey> for Invalidation {
    fn selects(&self, key: &CacheKey) -> bool {
        match (self, key) {
            (Self::Key(expected), key) => expected == key,
            (Self::CategoryPages(expected), CacheKey::CategoryProducts { category_id, .. }) => {
                expected == category_id
            }
            (Self::AllCategoryPages, CacheKey::CategoryProducts { .. }) => true,
            (Self::AllNavigationCategories, CacheKey::NavigationCategories { .. }) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Invalidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => key.fmt(f),
            Self::CategoryPages(category_id) => write!(f, "category-products:{category_id}:*"),
            Self::AllCategoryPages => f.write_str("category-products:*"),
            Self::AllNavigationCategories => f.write_str("navigation-categories:*"),
        }
    }
}

impl From<CacheKey> for Invalidation {
    fn from(key: CacheKey) -> Self {
        Self::Key(key)
    }
}

//! Domain rules layered over the wire types: navigation shape, ratings, prices, credentials.

pub mod auth;
pub mod error;
pub mod favourites;
pub mod navigation;
pub mod products;
pub mod reviews;
pub mod scrape;

pub use folio_api_types::{
    Category, CategoryId, FavouriteEdge, FavouriteId, NavigationId, NavigationTree, Product,
    ProductDetail, ProductDetails, ProductId, Review, ReviewId, ScrapeOutcome, UserId,
};

pub use scrape::ScrapeTarget;

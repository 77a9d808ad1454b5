//! Application layer: the catalog facade, its remote collaborator and the auto-scrape loop.

pub mod auto_scrape;
pub mod catalog;
pub mod error;
pub mod pagination;
pub mod remote;

//! Folio: a client-side caching data layer over a scraped book catalog.
//!
//! The `cache` module holds the generic entity store and the query/mutation coordinators; the
//! `application` module binds them to the catalog API and drives trigger-on-empty scraping.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;

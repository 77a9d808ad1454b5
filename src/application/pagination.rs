//! Page-window pagination for category listings and search results.
//!
//! Listings are offset-paged: a request names a 1-based page and a page size. Whether another
//! page exists is computed from the server's total count when it sends one, and otherwise
//! inferred from the page being full. The inference is a heuristic: a last page that holds
//! exactly `limit` items still reports a next page, which then comes back empty.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::num::NonZeroU32;

use serde::Serialize;

use crate::domain::error::DomainError;
use crate::domain::{Product, ProductId};

/// One page of an offset-paged listing. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    pub page: NonZeroU32,
    pub limit: NonZeroU32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Result<Self, DomainError> {
        let page = NonZeroU32::new(page)
            .ok_or_else(|| DomainError::validation("page numbers start at 1"))?;
        let limit = NonZeroU32::new(limit)
            .ok_or_else(|| DomainError::validation("page size must be greater than zero"))?;
        Ok(Self { page, limit })
    }

    pub fn first(limit: NonZeroU32) -> Self {
        Self {
            page: NonZeroU32::MIN,
            limit,
        }
    }

    pub fn next(&self) -> Option<Self> {
        self.page.checked_add(1).map(|page| Self {
            page,
            limit: self.limit,
        })
    }

    pub fn previous(&self) -> Option<Self> {
        NonZeroU32::new(self.page.get() - 1).map(|page| Self {
            page,
            limit: self.limit,
        })
    }

    /// Number of items on all earlier pages.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.get() - 1) * u64::from(self.limit.get())
    }
}

/// A page of products as returned by the remote, with the total when the server reports one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub total: Option<u64>,
}

impl ProductPage {
    pub fn new(items: Vec<Product>) -> Self {
        Self { items, total: None }
    }

    pub fn with_total(items: Vec<Product>, total: u64) -> Self {
        Self {
            items,
            total: Some(total),
        }
    }
}

/// Whether a page after `request` may exist.
///
/// With a total, exact. Without one, a full page is taken to mean "maybe more".
pub fn has_next_page(request: &PageRequest, fetched: usize, total: Option<u64>) -> bool {
    match total {
        Some(total) => request.offset() + u64::from(request.limit.get()) < total,
        None => fetched >= request.limit.get() as usize,
    }
}

/// A rendered page: the items plus navigation flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageWindow<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub has_next: bool,
    pub has_previous: bool,
    pub total: Option<u64>,
}

impl<T> PageWindow<T> {
    pub fn new(request: &PageRequest, items: Vec<T>, total: Option<u64>) -> Self {
        Self {
            has_next: has_next_page(request, items.len(), total),
            has_previous: request.page.get() > 1,
            page: request.page.get(),
            limit: request.limit.get(),
            items,
            total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl PageWindow<Product> {
    pub fn from_page(request: &PageRequest, page: &ProductPage) -> Self {
        Self::new(request, page.items.clone(), page.total)
    }
}

/// Pages fetched so far for one listing, composed into one scrolling list.
///
/// Pages are stored by index, so refetching a page replaces it rather than appending twice.
/// Flattening walks pages in order and keeps the first occurrence of each product, so a
/// product that shifted across a page boundary between fetches shows up once. Each page
/// remembers the store generation it was read from; a page whose generation moved on is out
/// of date even if its refetch already succeeded.
#[derive(Debug, Clone, Default)]
pub struct PageAccumulator {
    pages: BTreeMap<u32, AccumulatedPage>,
    has_next: bool,
}

#[derive(Debug, Clone)]
struct AccumulatedPage {
    items: Vec<Product>,
    generation: u64,
}

impl PageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `window`, read from the cache entry at `generation`.
    pub fn insert(&mut self, window: &PageWindow<Product>, generation: u64) {
        self.pages.insert(
            window.page,
            AccumulatedPage {
                items: window.items.clone(),
                generation,
            },
        );
        if Some(window.page) == self.last_page() {
            self.has_next = window.has_next;
        }
    }

    pub fn items(&self) -> Vec<Product> {
        let mut seen: HashSet<&ProductId> = HashSet::new();
        self.pages
            .values()
            .flat_map(|page| &page.items)
            .filter(|product| seen.insert(&product.id))
            .cloned()
            .collect()
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.keys().copied()
    }

    /// `(page, generation)` of every accumulated page, in page order.
    pub fn generations(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.pages.iter().map(|(page, entry)| (*page, entry.generation))
    }

    pub fn last_page(&self) -> Option<u32> {
        self.pages.keys().next_back().copied()
    }

    /// Page to request next, or `None` when the last loaded page reported no successor.
    pub fn next_request(&self, limit: NonZeroU32) -> Option<PageRequest> {
        match self.last_page() {
            None => Some(PageRequest::first(limit)),
            Some(_) if !self.has_next => None,
            Some(last) => PageRequest::new(last.checked_add(1)?, limit.get()).ok(),
        }
    }

    pub fn reset(&mut self) {
        self.pages.clear();
        self.has_next = false;
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use folio_api_types::CategoryId;
    use url::Url;

    use super::*;

    fn product(id: &str) -> Product {
        Product {
            id: ProductId::from(id),
            source_id: String::new(),
            title: format!("Book {id}"),
            author: None,
            price: None,
            currency: "GBP".to_string(),
            image_url: None,
            source_url: Url::parse("https://example.com/book").expect("url"),
            last_scraped_at: None,
            category_id: CategoryId(1),
        }
    }

    fn products(range: std::ops::Range<u32>) -> Vec<Product> {
        range.map(|index| product(&format!("p{index}"))).collect()
    }

    #[test]
    fn rejects_zero_page_and_limit() {
        assert!(PageRequest::new(0, 10).is_err());
        assert!(PageRequest::new(1, 0).is_err());
        let request = PageRequest::new(3, 10).expect("valid");
        assert_eq!(request.offset(), 20);
        assert_eq!(request.previous().map(|r| r.page.get()), Some(2));
        assert!(PageRequest::new(1, 10).expect("valid").previous().is_none());
    }

    #[test]
    fn full_page_without_total_predicts_next() {
        let request = PageRequest::new(1, 10).expect("valid");
        assert!(has_next_page(&request, 10, None));
        assert!(!has_next_page(&request, 9, None));
    }

    #[test]
    fn total_count_overrides_heuristic() {
        let request = PageRequest::new(1, 10).expect("valid");
        assert!(!has_next_page(&request, 10, Some(10)));
        assert!(has_next_page(&request, 10, Some(11)));
        let second = PageRequest::new(2, 10).expect("valid");
        assert!(!has_next_page(&second, 2, Some(12)));
    }

    #[test]
    fn window_flags() {
        let request = PageRequest::new(2, 10).expect("valid");
        let window = PageWindow::new(&request, products(0..2), None);
        assert!(window.has_previous);
        assert!(!window.has_next);
        assert_eq!(window.page, 2);
    }

    #[test]
    fn accumulator_flattens_in_page_order_without_duplicates() {
        let limit = NonZeroU32::new(2).expect("non-zero");
        let first = PageRequest::first(limit);
        let second = first.next().expect("page 2");
        let mut accumulator = PageAccumulator::new();

        // Page 2 lands first; p1 also shifted onto it.
        accumulator.insert(
            &PageWindow::new(&second, vec![product("p1"), product("p2")], None),
            1,
        );
        accumulator.insert(
            &PageWindow::new(&first, vec![product("p0"), product("p1")], None),
            1,
        );

        let ids: Vec<String> = accumulator
            .items()
            .iter()
            .map(|p| p.id.to_string())
            .collect();
        assert_eq!(ids, vec!["p0", "p1", "p2"]);
        assert_eq!(accumulator.pages().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn refetched_page_replaces_previous_copy() {
        let limit = NonZeroU32::new(2).expect("non-zero");
        let first = PageRequest::first(limit);
        let mut accumulator = PageAccumulator::new();
        accumulator.insert(&PageWindow::new(&first, products(0..2), None), 1);
        accumulator.insert(&PageWindow::new(&first, products(0..2), None), 3);
        assert_eq!(accumulator.items().len(), 2);
        assert_eq!(accumulator.generations().collect::<Vec<_>>(), vec![(1, 3)]);
    }

    #[test]
    fn next_request_follows_last_page() {
        let limit = NonZeroU32::new(10).expect("non-zero");
        let mut accumulator = PageAccumulator::new();
        assert_eq!(
            accumulator.next_request(limit),
            Some(PageRequest::first(limit))
        );

        let first = PageRequest::first(limit);
        accumulator.insert(&PageWindow::new(&first, products(0..10), None), 1);
        assert_eq!(
            accumulator.next_request(limit).map(|r| r.page.get()),
            Some(2)
        );

        let second = first.next().expect("page 2");
        accumulator.insert(&PageWindow::new(&second, products(10..12), None), 1);
        assert_eq!(accumulator.next_request(limit), None);

        accumulator.reset();
        assert!(accumulator.is_empty());
    }
}

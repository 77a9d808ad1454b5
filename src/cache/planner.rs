//! Invalidation planning.
//!
//! Maps each named mutation to the cache keys it makes untrustworthy.

use std::fmt;

use crate::domain::{CategoryId, ProductId, ScrapeTarget};

use super::keys::{CacheKey, Invalidation};

/// A write the catalog knows how to invalidate after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    AddFavourite { product_id: ProductId },
    AddReview { product_id: ProductId },
    TriggerScrape { target: ScrapeTarget },
}

impl MutationKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddFavourite { .. } => "add_favourite",
            Self::AddReview { .. } => "add_review",
            Self::TriggerScrape { .. } => "trigger_scrape",
        }
    }
}

/// Keys to invalidate once a mutation succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub targets: Vec<Invalidation>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InvalidationPlan {")?;
        for (index, target) in self.targets.iter().enumerate() {
            let separator = if index == 0 { " " } else { ", " };
            write!(f, "{separator}{target}")?;
        }
        f.write_str(" }")
    }
}

impl InvalidationPlan {
    pub fn for_mutation(kind: &MutationKind) -> Self {
        let targets = match kind {
            MutationKind::AddFavourite { .. } => vec![Invalidation::Key(CacheKey::Favourites)],
            MutationKind::AddReview { product_id } => {
                vec![Invalidation::Key(CacheKey::Reviews(product_id.clone()))]
            }
            MutationKind::TriggerScrape {
                target: ScrapeTarget::Category(category_id),
            } => Self::category_scrape(*category_id),
            // A navigation scrape may rebuild every category, so every listing goes stale.
            MutationKind::TriggerScrape {
                target: ScrapeTarget::Navigation,
            } => vec![
                Invalidation::Key(CacheKey::Navigation),
                Invalidation::AllNavigationCategories,
                Invalidation::AllCategoryPages,
            ],
        };
        Self { targets }
    }

    fn category_scrape(category_id: CategoryId) -> Vec<Invalidation> {
        vec![
            Invalidation::CategoryPages(category_id),
            Invalidation::Key(CacheKey::Navigation),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_favourite_invalidates_favourites_only() {
        let plan = InvalidationPlan::for_mutation(&MutationKind::AddFavourite {
            product_id: ProductId::from("P9"),
        });
        assert_eq!(plan.targets, vec![Invalidation::Key(CacheKey::Favourites)]);
    }

    #[test]
    fn add_review_invalidates_that_products_reviews() {
        let plan = InvalidationPlan::for_mutation(&MutationKind::AddReview {
            product_id: ProductId::from("P1"),
        });
        assert_eq!(
            plan.targets,
            vec![Invalidation::Key(CacheKey::Reviews(ProductId::from("P1")))]
        );
    }

    #[test]
    fn category_scrape_invalidates_all_pages_and_navigation() {
        let plan = InvalidationPlan::for_mutation(&MutationKind::TriggerScrape {
            target: ScrapeTarget::Category(CategoryId(4)),
        });
        assert_eq!(
            plan.to_string(),
            "InvalidationPlan { category-products:4:*, navigation }"
        );
    }

    #[test]
    fn navigation_scrape_invalidates_every_listing() {
        let plan = InvalidationPlan::for_mutation(&MutationKind::TriggerScrape {
            target: ScrapeTarget::Navigation,
        });
        assert!(plan.targets.contains(&Invalidation::Key(CacheKey::Navigation)));
        assert!(plan.targets.contains(&Invalidation::AllCategoryPages));
        assert!(plan.targets.contains(&Invalidation::AllNavigationCategories));
        assert!(!plan.is_empty());
    }
}

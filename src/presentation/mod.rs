//! Output helpers for the `folio` binary: pretty JSON or one short line per item.

use serde::Serialize;

use crate::application::auto_scrape::ScrapeState;
use crate::application::error::AppError;
use crate::application::pagination::PageWindow;
use crate::domain::favourites::FavouriteAck;
use crate::domain::navigation::category_tree;
use crate::domain::products::{author_label, price_label};
use crate::domain::{Category, FavouriteEdge, NavigationTree, Product, ProductDetail, Review, ScrapeOutcome};

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::unexpected(format!("failed to render output: {e}")))?;
    println!("{out}");
    Ok(())
}

pub fn print_lines(lines: impl IntoIterator<Item = String>) {
    for line in lines {
        println!("{line}");
    }
}

/// Navigation groups with their category trees, children indented under parents.
pub fn navigation_lines(trees: &[NavigationTree]) -> Vec<String> {
    let mut lines = Vec::new();
    for tree in trees {
        lines.push(format!("{} ({})", tree.title, tree.slug));
        for node in category_tree(tree) {
            lines.push(format!("  {}", category_line(&node.category)));
            for child in &node.children {
                lines.push(format!("    {}", category_line(child)));
            }
        }
    }
    lines
}

pub fn category_line(category: &Category) -> String {
    format!("[{}] {} ({})", category.id, category.title, category.slug)
}

pub fn product_line(product: &Product) -> String {
    format!(
        "{}  {} by {}  {}",
        product.id,
        product.title,
        author_label(product),
        price_label(product)
    )
}

pub fn product_detail_lines(detail: &ProductDetail) -> Vec<String> {
    let product = &detail.product;
    let mut lines = vec![
        product.title.clone(),
        format!("by {}", author_label(product)),
        price_label(product),
        product.source_url.to_string(),
    ];
    if let Some(details) = &detail.details {
        let fields = [
            ("ISBN", &details.isbn),
            ("Format", &details.format),
            ("Language", &details.language),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                lines.push(format!("{label}: {value}"));
            }
        }
        if let Some(description) = &details.description {
            lines.push(String::new());
            lines.push(description.clone());
        }
    }
    if !detail.reviews.is_empty() {
        lines.push(String::new());
        lines.extend(detail.reviews.iter().map(review_line));
    }
    lines
}

/// Items followed by a footer naming the page and whether more pages exist.
pub fn page_lines(window: &PageWindow<Product>) -> Vec<String> {
    let mut lines: Vec<String> = window.items.iter().map(product_line).collect();
    if window.is_empty() {
        lines.push("No products.".to_string());
    }
    let total = window
        .total
        .map(|total| format!(" of {total} products"))
        .unwrap_or_default();
    let more = if window.has_next { ", more available" } else { "" };
    lines.push(format!("-- page {}{total}{more}", window.page));
    lines
}

pub fn review_line(review: &Review) -> String {
    match review.comment.as_deref() {
        Some(comment) => format!("{}/5  {comment}", review.rating),
        None => format!("{}/5", review.rating),
    }
}

pub fn favourite_line(edge: &FavouriteEdge) -> String {
    match &edge.product {
        Some(product) => product_line(product),
        None => edge.product_id.to_string(),
    }
}

pub fn favourite_ack_line(ack: FavouriteAck) -> &'static str {
    match ack {
        FavouriteAck::Added => "Added to favourites.",
        FavouriteAck::AlreadyPresent => "Already in favourites.",
    }
}

pub fn scrape_outcome_line(outcome: &ScrapeOutcome) -> String {
    match outcome {
        ScrapeOutcome::Products(items) => format!("Scraped {} products.", items.len()),
        ScrapeOutcome::Navigation(trees) => format!("Scraped {} navigation groups.", trees.len()),
    }
}

pub fn scrape_state_line(state: &ScrapeState) -> String {
    format!("catalog: {state}")
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::application::pagination::PageRequest;
    use crate::domain::{CategoryId, NavigationId, ProductId};

    fn product(id: &str) -> Product {
        Product {
            id: ProductId::new(id),
            source_id: String::new(),
            title: format!("Book {id}"),
            author: Some("Ann Author".to_string()),
            price: Some(3.5),
            currency: "GBP".to_string(),
            image_url: None,
            source_url: Url::parse("https://example.com/b").expect("url"),
            last_scraped_at: None,
            category_id: CategoryId(1),
        }
    }

    #[test]
    fn navigation_lines_indent_children() {
        let tree = NavigationTree {
            id: NavigationId(1),
            title: "Books".to_string(),
            slug: "books".to_string(),
            categories: vec![
                Category {
                    id: CategoryId(1),
                    title: "Fiction".to_string(),
                    slug: "fiction".to_string(),
                    parent_id: None,
                },
                Category {
                    id: CategoryId(2),
                    title: "Crime".to_string(),
                    slug: "crime".to_string(),
                    parent_id: Some(CategoryId(1)),
                },
            ],
        };
        assert_eq!(
            navigation_lines(&[tree]),
            vec![
                "Books (books)".to_string(),
                "  [1] Fiction (fiction)".to_string(),
                "    [2] Crime (crime)".to_string(),
            ]
        );
    }

    #[test]
    fn page_lines_end_with_footer() {
        let request = PageRequest::new(1, 2).expect("page");
        let window = PageWindow::new(&request, vec![product("a"), product("b")], None);
        let lines = page_lines(&window);
        assert_eq!(lines[0], "a  Book a by Ann Author  3.50 GBP");
        assert_eq!(lines.last().map(String::as_str), Some("-- page 1, more available"));
    }

    #[test]
    fn empty_page_says_so() {
        let request = PageRequest::new(2, 10).expect("page");
        let window: PageWindow<Product> = PageWindow::new(&request, Vec::new(), Some(10));
        assert_eq!(
            page_lines(&window),
            vec!["No products.".to_string(), "-- page 2 of 10 products".to_string()]
        );
    }
}

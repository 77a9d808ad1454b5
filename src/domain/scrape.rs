use std::fmt;

use super::CategoryId;

/// What a scrape ingests: one category's products, or the navigation tree itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrapeTarget {
    Navigation,
    Category(CategoryId),
}

impl ScrapeTarget {
    /// Path segment used by `POST /api/scrape/{target}`.
    pub fn path_segment(&self) -> String {
        match self {
            Self::Navigation => "navigation".to_string(),
            Self::Category(id) => id.to_string(),
        }
    }
}

impl fmt::Display for ScrapeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigation => f.write_str("navigation"),
            Self::Category(id) => write!(f, "category:{id}"),
        }
    }
}

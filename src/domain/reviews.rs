//! Client-side review validation. Nothing here talks to the network.

use std::fmt;

use folio_api_types::ReviewRequest;

use super::error::DomainError;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
const MAX_COMMENT_CHARS: usize = 2000;

/// A star rating guaranteed to lie in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rating(u8);

impl Rating {
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if (i64::from(MIN_RATING)..=i64::from(MAX_RATING)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(DomainError::validation(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}, got {value}"
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{MAX_RATING}", self.0)
    }
}

/// A review that passed validation and may be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    rating: Rating,
    comment: Option<String>,
}

impl NewReview {
    /// Validate raw input. Blank comments are dropped rather than rejected.
    pub fn new(rating: i64, comment: Option<String>) -> Result<Self, DomainError> {
        let rating = Rating::new(rating)?;
        let comment = comment
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        if let Some(text) = &comment
            && text.chars().count() > MAX_COMMENT_CHARS
        {
            return Err(DomainError::validation(format!(
                "comment must be at most {MAX_COMMENT_CHARS} characters"
            )));
        }
        Ok(Self { rating, comment })
    }

    pub fn rating(&self) -> Rating {
        self.rating
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn to_request(&self) -> ReviewRequest {
        ReviewRequest {
            rating: self.rating.get(),
            comment: self.comment.clone(),
        }
    }
}

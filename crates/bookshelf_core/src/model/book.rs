//! Book domain model.
//!
//! # Responsibility
//! - Define the persisted `Book` read model and the `NewBook` write model.
//! - Normalize requested author names before they reach storage.
//!
//! # Invariants
//! - `isbn` is globally unique (enforced by storage).
//! - `rating` is within `0..=10`.
//! - A book lists at least one author; names are trimmed and unique.

use crate::model::validate::{require, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Surrogate identifier of a `books` row.
pub type BookId = i64;

/// Lifecycle state assigned when none is given.
pub const DEFAULT_BOOK_STATE: &str = "unread";

/// Highest accepted rating.
pub const MAX_RATING: u8 = 10;

static ISBN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9](?:[0-9-]*[0-9Xx])?$").expect("valid isbn regex"));

/// Persisted book joined with its current author set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub description: Option<String>,
    pub isbn: String,
    pub num_of_pages: u32,
    pub rating: u8,
    /// Free-text reading state, e.g. `unread`, `reading`, `read`.
    pub state: String,
    /// Epoch milliseconds.
    pub added_at: i64,
    /// Epoch milliseconds, bumped on every update.
    pub updated_at: i64,
    pub completed_at: Option<i64>,
    /// Author names. Order is display-only.
    pub authors: Vec<String>,
}

impl Book {
    /// Returns whether this book lists `name` as an author.
    pub fn has_author(&self, name: &str) -> bool {
        self.authors.iter().any(|author| author == name)
    }
}

/// Write model used by book create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub isbn: String,
    #[serde(default)]
    pub num_of_pages: u32,
    #[serde(default)]
    pub rating: u8,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default)]
    pub completed_at: Option<i64>,
    pub authors: Vec<String>,
}

fn default_state() -> String {
    DEFAULT_BOOK_STATE.to_string()
}

impl NewBook {
    /// Creates a write model with the required fields and defaults for the rest.
    pub fn new<I, S>(title: impl Into<String>, isbn: impl Into<String>, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: title.into(),
            description: None,
            isbn: isbn.into(),
            num_of_pages: 0,
            rating: 0,
            state: default_state(),
            completed_at: None,
            authors: authors.into_iter().map(Into::into).collect(),
        }
    }

    /// Validates fields that storage cannot check on its own.
    ///
    /// # Errors
    /// - `MissingField` for a blank title, ISBN or author name.
    /// - `InvalidFormat` for an ISBN that is not digits/hyphens with an
    ///   optional trailing `X`.
    /// - `OutOfRange` for a rating above 10.
    /// - `NoAuthors` when the author list is empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("title", &self.title)?;
        require("isbn", &self.isbn)?;
        let isbn = self.isbn.trim();
        if !ISBN_RE.is_match(isbn) {
            return Err(ValidationError::InvalidFormat {
                field: "isbn",
                value: isbn.to_string(),
            });
        }
        if self.rating > MAX_RATING {
            return Err(ValidationError::OutOfRange {
                field: "rating",
                min: 0,
                max: i64::from(MAX_RATING),
                actual: i64::from(self.rating),
            });
        }
        if self.authors.is_empty() {
            return Err(ValidationError::NoAuthors);
        }
        for author in &self.authors {
            require("author", author)?;
        }
        Ok(())
    }

    /// Returns trimmed author names with duplicates removed, keeping the
    /// first occurrence of each.
    pub fn author_names(&self) -> Vec<String> {
        normalize_author_names(&self.authors)
    }
}

/// Trims names, drops blanks and removes duplicates while keeping order.
pub fn normalize_author_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

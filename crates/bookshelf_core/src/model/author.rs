//! Author domain model.
//!
//! # Invariants
//! - `name` is globally unique and non-blank.
//! - An author is shared by any number of books and is pruned once no book
//!   references it.

use crate::model::validate::{require, ValidationError};
use serde::{Deserialize, Serialize};

/// Surrogate identifier of an `authors` row.
pub type AuthorId = i64;

/// Persisted author.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
}

/// Write model for author create/rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuthor {
    pub name: String,
}

impl NewAuthor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require("name", &self.name)
    }
}

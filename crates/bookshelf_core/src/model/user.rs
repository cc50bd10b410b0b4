//! User domain model.
//!
//! Password hashing happens outside core; `hashed_password` is stored and
//! returned as an opaque string.

use crate::model::validate::{require, ValidationError};
use serde::{Deserialize, Serialize};

/// Surrogate identifier of a `users` row.
pub type UserId = i64;

/// Role assigned when none is given.
pub const DEFAULT_USER_ROLE: &str = "user";

/// Persisted user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub role: String,
    /// Epoch milliseconds.
    pub added_at: i64,
}

/// Write model for user create/update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub hashed_password: String,
    pub role: String,
}

impl NewUser {
    /// Creates a write model with the default role.
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        hashed_password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            username: username.into(),
            hashed_password: hashed_password.into(),
            role: DEFAULT_USER_ROLE.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require("name", &self.name)?;
        require("username", &self.username)?;
        require("hashed_password", &self.hashed_password)?;
        require("role", &self.role)
    }
}

//! Field-level validation errors shared by the write models.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Validation failure for a write model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field is empty or whitespace only.
    MissingField(&'static str),
    /// A field does not have the expected shape.
    InvalidFormat { field: &'static str, value: String },
    /// A numeric field is outside its inclusive range.
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
        actual: i64,
    },
    /// A book must name at least one author.
    NoAuthors,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "{field}: value is missing"),
            Self::InvalidFormat { field, value } => {
                write!(f, "{field}: incorrect format `{value}`")
            }
            Self::OutOfRange {
                field,
                min,
                max,
                actual,
            } => write!(f, "{field}: {actual} is outside {min}..={max}"),
            Self::NoAuthors => write!(f, "author: value is missing"),
        }
    }
}

impl Error for ValidationError {}

/// Returns `MissingField` when `value` is blank.
pub(crate) fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

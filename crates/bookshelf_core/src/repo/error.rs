//! Repository error taxonomy.
//!
//! # Invariants
//! - `NotFound` targets one row; `NoRows` means a collection matched nothing.
//! - `Conflict` is only produced from UNIQUE/PRIMARY KEY violations.
//! - Context added by `in_operation` never changes the error kind.

use crate::db::DbError;
use crate::model::validate::ValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Catalog entity named in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Book,
    Author,
    User,
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Book => "book",
            Self::Author => "author",
            Self::User => "user",
        })
    }
}

/// Coarse error category callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoErrorKind {
    NotFound,
    NoRows,
    Conflict,
    /// Storage failure (connectivity, statement error, deadline). Retrying
    /// may succeed.
    Transient,
    /// Input or persisted state is invalid, or the connection is not ready.
    Invalid,
}

/// Repository error for catalog persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    NotFound {
        entity: Entity,
        key: String,
    },
    NoRows(Entity),
    Conflict {
        entity: Entity,
        field: &'static str,
        value: String,
    },
    Db {
        /// Operation being performed, e.g. `update book 7`.
        operation: Option<String>,
        source: DbError,
    },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    InvalidData(String),
}

impl RepoError {
    pub(crate) fn not_found(entity: Entity, key: impl Display) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub(crate) fn conflict(entity: Entity, field: &'static str, value: impl Into<String>) -> Self {
        Self::Conflict {
            entity,
            field,
            value: value.into(),
        }
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> RepoErrorKind {
        match self {
            Self::NotFound { .. } => RepoErrorKind::NotFound,
            Self::NoRows(_) => RepoErrorKind::NoRows,
            Self::Conflict { .. } => RepoErrorKind::Conflict,
            Self::Db { .. } => RepoErrorKind::Transient,
            Self::Validation(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. }
            | Self::InvalidData(_) => RepoErrorKind::Invalid,
        }
    }

    /// Returns whether retrying the operation might succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == RepoErrorKind::Transient
    }

    /// Attaches operation context to storage errors that have none yet.
    pub(crate) fn in_operation(self, operation: impl FnOnce() -> String) -> Self {
        match self {
            Self::Db {
                operation: None,
                source,
            } => Self::Db {
                operation: Some(operation()),
                source,
            },
            other => other,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { entity, key } => write!(f, "{entity} not found: {key}"),
            Self::NoRows(entity) => write!(f, "no {entity} rows found"),
            Self::Conflict {
                entity,
                field,
                value,
            } => write!(f, "{entity} with {field} `{value}` already exists"),
            Self::Db {
                operation: Some(operation),
                source,
            } => write!(f, "db: {operation} failed: {source}"),
            Self::Db {
                operation: None,
                source,
            } => write!(f, "db: {source}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "catalog repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "catalog repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "catalog repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted catalog data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db {
            operation: None,
            source: value,
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::from(DbError::Sqlite(value))
    }
}

#[cfg(test)]
mod tests {
    use super::{Entity, RepoError, RepoErrorKind};
    use crate::db::DbError;
    use std::time::Duration;

    #[test]
    fn context_is_attached_once_and_keeps_kind() {
        let err = RepoError::from(DbError::DeadlineExceeded(Duration::from_millis(5)))
            .in_operation(|| "update book 7".to_string())
            .in_operation(|| "outer".to_string());
        assert_eq!(err.kind(), RepoErrorKind::Transient);
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "db: update book 7 failed: transaction deadline of 5ms exceeded"
        );
    }

    #[test]
    fn sentinel_kinds_are_not_rewritten_by_context() {
        let err = RepoError::not_found(Entity::Book, 42).in_operation(|| "get book".to_string());
        assert_eq!(err.kind(), RepoErrorKind::NotFound);
        assert_eq!(err.to_string(), "book not found: 42");

        let conflict = RepoError::conflict(Entity::Book, "isbn", "1");
        assert_eq!(conflict.kind(), RepoErrorKind::Conflict);
        assert_eq!(RepoError::NoRows(Entity::Author).kind(), RepoErrorKind::NoRows);
    }
}

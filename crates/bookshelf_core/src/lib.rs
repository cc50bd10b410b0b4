//! Core storage for the bookshelf catalog.
//! Books, authors and users live in SQLite; this crate owns the invariants
//! that keep the book/author relationship consistent.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use db::{
    open_db, open_db_in_memory, open_db_with_config, run_in_transaction, DbError, StoreConfig,
    TxBehavior, TxOptions,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::author::{Author, AuthorId, NewAuthor};
pub use model::book::{Book, BookId, NewBook};
pub use model::user::{NewUser, User, UserId};
pub use model::validate::ValidationError;
pub use repo::author_repo::{AuthorRepository, SqliteAuthorRepository};
pub use repo::book_repo::{BookRepository, SqliteBookRepository};
pub use repo::error::{Entity, RepoError, RepoErrorKind, RepoResult};
pub use repo::user_repo::{SqliteUserRepository, UserRepository};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

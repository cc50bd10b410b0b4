//! Catalog domain model.
//!
//! # Responsibility
//! - Define the read models returned by repositories (`Book`, `Author`,
//!   `User`) and the write models they accept (`NewBook`, `NewAuthor`,
//!   `NewUser`).
//! - Own field-level validation that must pass before any SQL runs.
//!
//! # Invariants
//! - Every persisted entity is identified by a surrogate integer id.
//! - Books do not own authors; the association lives in `books_authors`.

pub mod author;
pub mod book;
pub mod user;
pub mod validate;

//! Repository layer: catalog persistence over SQLite.
//!
//! # Responsibility
//! - Define entity-level data access contracts for books, authors and users.
//! - Keep the book/author junction consistent inside one transaction per
//!   write.
//!
//! # Invariants
//! - Repository writes validate their input before any SQL runs.
//! - Repository APIs return semantic errors (`NotFound`, `NoRows`,
//!   `Conflict`) in addition to storage errors.
//! - No author row outlives its last book after a book update or delete.

pub mod author_registry;
pub mod author_repo;
pub mod book_repo;
pub mod error;
pub mod relationship;
mod schema;
pub mod user_repo;

//! Author de-duplication and orphan pruning.
//!
//! # Responsibility
//! - Resolve an author name to its stable id, inserting the row only when no
//!   author with that name exists.
//! - Delete authors no book references any more.
//!
//! # Invariants
//! - Callers pass a connection that is already inside a transaction; these
//!   helpers never begin or commit one.
//! - Dedup relies on the UNIQUE constraint on `authors.name`: a name inserted
//!   concurrently is picked up by the lookup fallback instead of failing.

use crate::model::author::AuthorId;
use crate::model::validate::ValidationError;
use crate::repo::error::RepoResult;
use log::info;
use rusqlite::Connection;

/// Returns the id of the author named `name`, creating the row if absent.
///
/// `name` is trimmed before it is stored or looked up.
pub fn resolve_or_create(conn: &Connection, name: &str) -> RepoResult<AuthorId> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingField("author").into());
    }

    let inserted = conn.execute("INSERT OR IGNORE INTO authors (name) VALUES (?1);", [name])?;
    if inserted == 0 {
        let existing = conn.query_row("SELECT id FROM authors WHERE name = ?1;", [name], |row| {
            row.get(0)
        })?;
        return Ok(existing);
    }

    Ok(conn.last_insert_rowid())
}

/// Resolves every name in `names`. Output ids keep the input order.
pub fn resolve_or_create_all(conn: &Connection, names: &[String]) -> RepoResult<Vec<AuthorId>> {
    names
        .iter()
        .map(|name| resolve_or_create(conn, name))
        .collect()
}

/// Deletes every author with zero `books_authors` rows.
///
/// Returns the number of authors removed.
pub fn delete_unreferenced(conn: &Connection) -> RepoResult<usize> {
    let pruned = conn.execute(
        "DELETE FROM authors
         WHERE NOT EXISTS (
            SELECT 1
            FROM books_authors ba
            WHERE ba.author_id = authors.id
         );",
        [],
    )?;

    if pruned > 0 {
        info!("event=author_prune module=repo status=ok pruned={pruned}");
    }
    Ok(pruned)
}

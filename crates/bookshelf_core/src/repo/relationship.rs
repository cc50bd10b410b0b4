//! Book/author junction maintenance.
//!
//! # Responsibility
//! - Insert and remove `books_authors` rows.
//! - Traverse the relationship in both directions.
//! - Compute the order-independent difference between two author sets.
//!
//! # Invariants
//! - `link` is idempotent: re-linking an existing pair is a no-op.
//! - Writers call `link` before `unlink_except` when reconciling one book.
//! - Like the author registry, nothing here begins or commits a transaction.

use crate::model::author::AuthorId;
use crate::model::book::{Book, BookId};
use crate::repo::book_repo::query_books;
use crate::repo::error::RepoResult;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::HashSet;

/// Links `book_id` to every id in `author_ids`.
///
/// Returns the number of link rows actually inserted.
pub fn link(conn: &Connection, book_id: BookId, author_ids: &[AuthorId]) -> RepoResult<usize> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO books_authors (book_id, author_id) VALUES (?1, ?2);",
    )?;
    let mut inserted = 0;
    for author_id in author_ids {
        inserted += stmt.execute(params![book_id, author_id])?;
    }
    Ok(inserted)
}

/// Deletes links of `book_id` whose author is not in `keep_author_ids`.
///
/// An empty keep set removes every link of the book. Returns the number of
/// link rows removed.
pub fn unlink_except(
    conn: &Connection,
    book_id: BookId,
    keep_author_ids: &[AuthorId],
) -> RepoResult<usize> {
    if keep_author_ids.is_empty() {
        return unlink_all(conn, book_id);
    }

    let placeholders = vec!["?"; keep_author_ids.len()].join(", ");
    let sql = format!(
        "DELETE FROM books_authors
         WHERE book_id = ?
           AND author_id NOT IN ({placeholders});"
    );
    let mut bind_values = Vec::with_capacity(keep_author_ids.len() + 1);
    bind_values.push(Value::Integer(book_id));
    bind_values.extend(keep_author_ids.iter().map(|id| Value::Integer(*id)));

    let removed = conn.execute(&sql, params_from_iter(bind_values))?;
    Ok(removed)
}

/// Deletes every link of `book_id`.
pub fn unlink_all(conn: &Connection, book_id: BookId) -> RepoResult<usize> {
    let removed = conn.execute("DELETE FROM books_authors WHERE book_id = ?1;", [book_id])?;
    Ok(removed)
}

/// Deletes every link of `author_id`.
pub fn unlink_author(conn: &Connection, author_id: AuthorId) -> RepoResult<usize> {
    let removed = conn.execute(
        "DELETE FROM books_authors WHERE author_id = ?1;",
        [author_id],
    )?;
    Ok(removed)
}

/// Returns the names of the authors linked to `book_id`, sorted by name.
pub fn authors_of(conn: &Connection, book_id: BookId) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT a.name
         FROM books_authors ba
         INNER JOIN authors a ON a.id = ba.author_id
         WHERE ba.book_id = ?1
         ORDER BY a.name ASC;",
    )?;
    let mut rows = stmt.query([book_id])?;
    let mut names = Vec::new();
    while let Some(row) = rows.next()? {
        names.push(row.get(0)?);
    }
    Ok(names)
}

/// Returns every book linked to the author named `author_name`, each with
/// its full author set, ordered by book id.
pub fn books_of(conn: &Connection, author_name: &str) -> RepoResult<Vec<Book>> {
    query_books(
        conn,
        "WHERE b.id IN (
            SELECT ba.book_id
            FROM books_authors ba
            INNER JOIN authors a ON a.id = ba.author_id
            WHERE a.name = ?1
         )",
        [author_name.trim()],
    )
}

/// Order-independent difference between a book's current and requested
/// author names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorSetDiff {
    /// Requested names the book is not linked to yet, in request order.
    pub added: Vec<String>,
    /// Currently linked names that were not requested, in current order.
    pub removed: Vec<String>,
}

impl AuthorSetDiff {
    pub fn between(current: &[String], requested: &[String]) -> Self {
        let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();
        let requested_set: HashSet<&str> = requested.iter().map(String::as_str).collect();

        Self {
            added: requested
                .iter()
                .filter(|name| !current_set.contains(name.as_str()))
                .cloned()
                .collect(),
            removed: current
                .iter()
                .filter(|name| !requested_set.contains(name.as_str()))
                .cloned()
                .collect(),
        }
    }

    /// True when both sets already contain the same names.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn is_added(&self, name: &str) -> bool {
        self.added.iter().any(|added| added == name)
    }
}

#[cfg(test)]
mod tests {
    use super::{authors_of, link, unlink_except, AuthorSetDiff};
    use crate::db::open_db_in_memory;
    use crate::repo::author_registry::resolve_or_create;
    use rusqlite::Connection;

    fn insert_book(conn: &Connection, isbn: &str) -> i64 {
        conn.execute(
            "INSERT INTO books (title, isbn) VALUES ('Book', ?1);",
            [isbn],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn link_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM books_authors;", [], |row| row.get(0))
            .unwrap()
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn diff_ignores_order() {
        let diff = AuthorSetDiff::between(
            &names(&["Ken Adams", "John Doe"]),
            &names(&["John Doe", "Ken Adams"]),
        );
        assert!(diff.is_empty());
    }

    #[test]
    fn diff_reports_added_and_removed() {
        let diff = AuthorSetDiff::between(
            &names(&["John Doe", "Ken Adams", "Regina Phallange"]),
            &names(&["Regina Phallange", "Ken Adams", "Phoebe Buffay"]),
        );
        assert_eq!(diff.added, names(&["Phoebe Buffay"]));
        assert_eq!(diff.removed, names(&["John Doe"]));
        assert!(diff.is_added("Phoebe Buffay"));
        assert!(!diff.is_added("Ken Adams"));
    }

    #[test]
    fn rename_is_one_removal_and_one_addition() {
        let diff = AuthorSetDiff::between(&names(&["S.A. Corey"]), &names(&["James S.A. Corey"]));
        assert_eq!(diff.added, names(&["James S.A. Corey"]));
        assert_eq!(diff.removed, names(&["S.A. Corey"]));
    }

    #[test]
    fn relinking_an_existing_pair_inserts_nothing() {
        let conn = open_db_in_memory().unwrap();
        let book_id = insert_book(&conn, "1");
        let ken = resolve_or_create(&conn, "Ken Adams").unwrap();
        let john = resolve_or_create(&conn, "John Doe").unwrap();

        assert_eq!(link(&conn, book_id, &[ken]).unwrap(), 1);
        assert_eq!(link(&conn, book_id, &[ken, john]).unwrap(), 1);
        assert_eq!(link(&conn, book_id, &[ken, john]).unwrap(), 0);
        assert_eq!(link_count(&conn), 2);
    }

    #[test]
    fn unlink_except_keeps_listed_pairs_and_other_books() {
        let conn = open_db_in_memory().unwrap();
        let book_id = insert_book(&conn, "1");
        let other_book = insert_book(&conn, "2");
        let ken = resolve_or_create(&conn, "Ken Adams").unwrap();
        let john = resolve_or_create(&conn, "John Doe").unwrap();
        let regina = resolve_or_create(&conn, "Regina Phallange").unwrap();
        link(&conn, book_id, &[ken, john, regina]).unwrap();
        link(&conn, other_book, &[john]).unwrap();
        let kept_rowids: Vec<i64> = {
            let mut stmt = conn
                .prepare(
                    "SELECT rowid FROM books_authors
                     WHERE book_id = ?1 AND author_id IN (?2, ?3)
                     ORDER BY rowid;",
                )
                .unwrap();
            let rowids = stmt
                .query_map([book_id, ken, regina], |row| row.get(0))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap();
            rowids
        };

        assert_eq!(unlink_except(&conn, book_id, &[ken, regina]).unwrap(), 1);
        assert_eq!(
            authors_of(&conn, book_id).unwrap(),
            vec!["Ken Adams".to_string(), "Regina Phallange".to_string()]
        );
        assert_eq!(
            authors_of(&conn, other_book).unwrap(),
            vec!["John Doe".to_string()]
        );
        let rowids_after: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM books_authors WHERE rowid IN (?1, ?2);",
                [kept_rowids[0], kept_rowids[1]],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(rowids_after, 2);

        assert_eq!(unlink_except(&conn, book_id, &[]).unwrap(), 2);
        assert!(authors_of(&conn, book_id).unwrap().is_empty());
        assert_eq!(link_count(&conn), 1);
    }
}

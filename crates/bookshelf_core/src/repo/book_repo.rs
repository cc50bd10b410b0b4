//! Book repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD APIs over `books` joined with their author set.
//! - Compose the book row write, author resolution and link reconciliation
//!   into one transaction per write.
//!
//! # Invariants
//! - Write paths call `NewBook::validate()` before any SQL runs.
//! - A failed step rolls back the whole write; no partially reconciled book
//!   is ever committed.
//! - An update whose author set is unchanged performs no relationship writes.
//! - Renaming an author of one book relinks the book; the shared author row
//!   is never renamed in place.
//! - After every update or delete that dropped links, unreferenced authors
//!   are pruned in the same transaction.

use crate::db::{is_unique_violation, run_in_transaction, StoreConfig, TxOptions};
use crate::model::book::{Book, BookId, NewBook, DEFAULT_BOOK_STATE, MAX_RATING};
use crate::repo::author_registry;
use crate::repo::error::{Entity, RepoError, RepoResult};
use crate::repo::relationship::{self, AuthorSetDiff};
use crate::repo::schema::{ensure_connection_ready, CATALOG_TABLES};
use log::{info, warn};
use rusqlite::{params, Connection, Params, Row};

const BOOK_SELECT_SQL: &str = "SELECT
    b.id,
    b.title,
    b.description,
    b.isbn,
    b.num_of_pages,
    b.rating,
    b.state,
    b.added_at,
    b.updated_at,
    b.completed_at
FROM books b";

/// Repository interface for book operations.
pub trait BookRepository {
    /// Creates a book, its missing authors and its links.
    fn create_book(&mut self, book: &NewBook) -> RepoResult<Book>;
    /// Replaces book fields and reconciles its author set.
    fn update_book(&mut self, id: BookId, book: &NewBook) -> RepoResult<Book>;
    /// Deletes a book, its links and any author left without books.
    fn delete_book(&mut self, id: BookId) -> RepoResult<()>;
    fn get_book(&self, id: BookId) -> RepoResult<Book>;
    /// Returns the first book (lowest id) with exactly this title.
    fn get_book_by_title(&self, title: &str) -> RepoResult<Book>;
    fn get_book_by_isbn(&self, isbn: &str) -> RepoResult<Book>;
    /// Lists books linked to the named author. `NoRows` when none match.
    fn list_books_by_author(&self, name: &str) -> RepoResult<Vec<Book>>;
    /// Lists all books ordered by id. `NoRows` when the catalog is empty.
    fn list_books(&self) -> RepoResult<Vec<Book>>;
    fn count_books(&self) -> RepoResult<usize>;
}

/// SQLite-backed book repository.
pub struct SqliteBookRepository<'conn> {
    conn: &'conn mut Connection,
    tx_options: TxOptions,
}

impl<'conn> SqliteBookRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection with the
    /// default `StoreConfig`.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        Self::try_new_with_config(conn, &StoreConfig::default())
    }

    /// Constructs a repository whose writes use the transaction deadline of
    /// `config`. Pass the same config the connection was opened with.
    pub fn try_new_with_config(
        conn: &'conn mut Connection,
        config: &StoreConfig,
    ) -> RepoResult<Self> {
        ensure_connection_ready(conn, CATALOG_TABLES)?;
        Ok(Self {
            conn,
            tx_options: TxOptions::from(config),
        })
    }

    /// Replaces the transaction options used by write paths.
    pub fn with_tx_options(mut self, tx_options: TxOptions) -> Self {
        self.tx_options = tx_options;
        self
    }
}

impl BookRepository for SqliteBookRepository<'_> {
    fn create_book(&mut self, book: &NewBook) -> RepoResult<Book> {
        book.validate()?;
        let authors = book.author_names();

        let result = run_in_transaction(
            self.conn,
            &self.tx_options,
            move |tx| -> RepoResult<Book> {
                let mut created = insert_book_row(tx, book)?;
                let author_ids = author_registry::resolve_or_create_all(tx, &authors)?;
                relationship::link(tx, created.id, &author_ids)?;
                created.authors = authors;
                Ok(created)
            },
        )
        .map_err(|err| err.in_operation(|| "create book".to_string()));

        match result {
            Ok(created) => {
                info!(
                    "event=book_create module=repo status=ok book_id={} authors={}",
                    created.id,
                    created.authors.len()
                );
                Ok(created)
            }
            Err(err) => Err(log_failure("book_create", err)),
        }
    }

    fn update_book(&mut self, id: BookId, book: &NewBook) -> RepoResult<Book> {
        book.validate()?;
        let requested = book.author_names();

        let result = run_in_transaction(
            self.conn,
            &self.tx_options,
            move |tx| -> RepoResult<(Book, ReconcileStats)> {
                update_book_row(tx, id, book)?;

                let current = relationship::authors_of(tx, id)?;
                let diff = AuthorSetDiff::between(&current, &requested);
                let reconciled = if diff.is_empty() {
                    ReconcileStats::default()
                } else {
                    reconcile_authors(tx, id, &requested, &diff)?
                };

                let mut updated = fetch_book_row(tx, id)?;
                updated.authors = requested;
                Ok((updated, reconciled))
            },
        )
        .map_err(|err| err.in_operation(|| format!("update book {id}")));

        match result {
            Ok((updated, stats)) => {
                info!(
                    "event=book_update module=repo status=ok book_id={} linked={} unlinked={} pruned={}",
                    id, stats.linked, stats.unlinked, stats.pruned
                );
                Ok(updated)
            }
            Err(err) => Err(log_failure("book_update", err)),
        }
    }

    fn delete_book(&mut self, id: BookId) -> RepoResult<()> {
        let result = run_in_transaction(self.conn, &self.tx_options, |tx| -> RepoResult<_> {
            // Links go first so the book row never has dangling references;
            // pruning must see both deletions.
            let unlinked = relationship::unlink_all(tx, id)?;
            let deleted = tx.execute("DELETE FROM books WHERE id = ?1;", [id])?;
            if deleted == 0 {
                return Err(RepoError::not_found(Entity::Book, id));
            }
            let pruned = author_registry::delete_unreferenced(tx)?;
            Ok((unlinked, pruned))
        })
        .map_err(|err| err.in_operation(|| format!("delete book {id}")));

        match result {
            Ok((unlinked, pruned)) => {
                info!(
                    "event=book_delete module=repo status=ok book_id={} unlinked={} pruned={}",
                    id, unlinked, pruned
                );
                Ok(())
            }
            Err(err) => Err(log_failure("book_delete", err)),
        }
    }

    fn get_book(&self, id: BookId) -> RepoResult<Book> {
        query_books(self.conn, "WHERE b.id = ?1", [id])?
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::not_found(Entity::Book, id))
    }

    fn get_book_by_title(&self, title: &str) -> RepoResult<Book> {
        query_books(self.conn, "WHERE b.title = ?1", [title.trim()])?
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::not_found(Entity::Book, format!("title `{title}`")))
    }

    fn get_book_by_isbn(&self, isbn: &str) -> RepoResult<Book> {
        query_books(self.conn, "WHERE b.isbn = ?1", [isbn.trim()])?
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::not_found(Entity::Book, format!("isbn `{isbn}`")))
    }

    fn list_books_by_author(&self, name: &str) -> RepoResult<Vec<Book>> {
        non_empty(relationship::books_of(self.conn, name)?)
    }

    fn list_books(&self) -> RepoResult<Vec<Book>> {
        non_empty(query_books(self.conn, "", params![])?)
    }

    fn count_books(&self) -> RepoResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM books;", [], |row| row.get(0))?;
        usize::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative book count {count}")))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ReconcileStats {
    linked: usize,
    unlinked: usize,
    pruned: usize,
}

/// Brings the links of `book_id` in line with `requested`, driven by `diff`.
fn reconcile_authors(
    tx: &Connection,
    book_id: BookId,
    requested: &[String],
    diff: &AuthorSetDiff,
) -> RepoResult<ReconcileStats> {
    let requested_ids = author_registry::resolve_or_create_all(tx, requested)?;
    let added_ids: Vec<_> = requested
        .iter()
        .zip(&requested_ids)
        .filter(|(name, _)| diff.is_added(name))
        .map(|(_, id)| *id)
        .collect();

    let mut stats = ReconcileStats {
        linked: relationship::link(tx, book_id, &added_ids)?,
        ..ReconcileStats::default()
    };
    if !diff.removed.is_empty() {
        stats.unlinked = relationship::unlink_except(tx, book_id, &requested_ids)?;
        stats.pruned = author_registry::delete_unreferenced(tx)?;
    }
    Ok(stats)
}

fn insert_book_row(tx: &Connection, book: &NewBook) -> RepoResult<Book> {
    let isbn = book.isbn.trim();
    let state = normalized_state(&book.state);
    let (id, added_at, updated_at) = tx
        .query_row(
            "INSERT INTO books (
                title,
                description,
                isbn,
                num_of_pages,
                rating,
                state,
                completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING id, added_at, updated_at;",
            params![
                book.title.trim(),
                book.description.as_deref(),
                isbn,
                book.num_of_pages,
                book.rating,
                state,
                book.completed_at,
            ],
            |row| {
                Ok((
                    row.get::<_, BookId>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .map_err(|err| isbn_conflict(err, isbn))?;

    Ok(Book {
        id,
        title: book.title.trim().to_string(),
        description: book.description.clone(),
        isbn: isbn.to_string(),
        num_of_pages: book.num_of_pages,
        rating: book.rating,
        state: state.to_string(),
        added_at,
        updated_at,
        completed_at: book.completed_at,
        authors: Vec::new(),
    })
}

fn update_book_row(tx: &Connection, id: BookId, book: &NewBook) -> RepoResult<()> {
    let isbn = book.isbn.trim();
    let changed = tx
        .execute(
            "UPDATE books
             SET
                title = ?1,
                description = ?2,
                isbn = ?3,
                num_of_pages = ?4,
                rating = ?5,
                state = ?6,
                completed_at = ?7,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?8;",
            params![
                book.title.trim(),
                book.description.as_deref(),
                isbn,
                book.num_of_pages,
                book.rating,
                normalized_state(&book.state),
                book.completed_at,
                id,
            ],
        )
        .map_err(|err| isbn_conflict(err, isbn))?;

    if changed == 0 {
        return Err(RepoError::not_found(Entity::Book, id));
    }
    Ok(())
}

fn fetch_book_row(conn: &Connection, id: BookId) -> RepoResult<Book> {
    let mut stmt = conn.prepare(&format!("{BOOK_SELECT_SQL} WHERE b.id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    let book = match rows.next()? {
        Some(row) => parse_book_row(row)?,
        None => return Err(RepoError::not_found(Entity::Book, id)),
    };
    Ok(book)
}

/// Selects books matching `filter_sql` (a `WHERE` clause or empty), ordered
/// by id, each with its author names.
pub(crate) fn query_books<P: Params>(
    conn: &Connection,
    filter_sql: &str,
    params: P,
) -> RepoResult<Vec<Book>> {
    let mut stmt = conn.prepare(&format!("{BOOK_SELECT_SQL} {filter_sql} ORDER BY b.id ASC;"))?;
    let mut rows = stmt.query(params)?;
    let mut books = Vec::new();
    while let Some(row) = rows.next()? {
        let mut book = parse_book_row(row)?;
        book.authors = relationship::authors_of(conn, book.id)?;
        books.push(book);
    }
    Ok(books)
}

fn parse_book_row(row: &Row<'_>) -> RepoResult<Book> {
    let rating: u8 = row.get("rating")?;
    if rating > MAX_RATING {
        return Err(RepoError::InvalidData(format!(
            "invalid rating `{rating}` in books.rating"
        )));
    }

    Ok(Book {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        isbn: row.get("isbn")?,
        num_of_pages: row.get("num_of_pages")?,
        rating,
        state: row.get("state")?,
        added_at: row.get("added_at")?,
        updated_at: row.get("updated_at")?,
        completed_at: row.get("completed_at")?,
        authors: Vec::new(),
    })
}

fn normalized_state(state: &str) -> &str {
    let trimmed = state.trim();
    if trimmed.is_empty() {
        DEFAULT_BOOK_STATE
    } else {
        trimmed
    }
}

fn isbn_conflict(err: rusqlite::Error, isbn: &str) -> RepoError {
    if is_unique_violation(&err) {
        RepoError::conflict(Entity::Book, "isbn", isbn)
    } else {
        err.into()
    }
}

fn non_empty(books: Vec<Book>) -> RepoResult<Vec<Book>> {
    if books.is_empty() {
        return Err(RepoError::NoRows(Entity::Book));
    }
    Ok(books)
}

fn log_failure(event: &str, err: RepoError) -> RepoError {
    warn!(
        "event={} module=repo status=error error_kind={:?} error={}",
        event,
        err.kind(),
        err
    );
    err
}

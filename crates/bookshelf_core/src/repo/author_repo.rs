//! Author repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide entity-level CRUD over `authors`.
//!
//! # Invariants
//! - `create_author` is insert-or-get: an existing name returns the existing
//!   author instead of a conflict.
//! - `update_author` renames this author entity for every book that lists it;
//!   book writes never take this path.
//! - `delete_author` removes the author's links before the author row.

use crate::db::{is_unique_violation, run_in_transaction, StoreConfig, TxOptions};
use crate::model::author::{Author, AuthorId, NewAuthor};
use crate::repo::author_registry;
use crate::repo::error::{Entity, RepoError, RepoResult};
use crate::repo::relationship;
use crate::repo::schema::{ensure_connection_ready, CATALOG_TABLES};
use log::info;
use rusqlite::{params, Connection, OptionalExtension};

/// Repository interface for author operations.
pub trait AuthorRepository {
    fn create_author(&mut self, author: &NewAuthor) -> RepoResult<Author>;
    fn update_author(&mut self, id: AuthorId, author: &NewAuthor) -> RepoResult<Author>;
    fn delete_author(&mut self, id: AuthorId) -> RepoResult<()>;
    fn get_author(&self, id: AuthorId) -> RepoResult<Author>;
    fn get_author_by_name(&self, name: &str) -> RepoResult<Author>;
    /// Lists all authors sorted by name. `NoRows` when there are none.
    fn list_authors(&self) -> RepoResult<Vec<Author>>;
    /// Names of all authors sorted by name. `NoRows` when there are none.
    fn list_author_names(&self) -> RepoResult<Vec<String>>;
    fn count_authors(&self) -> RepoResult<usize>;
}

/// SQLite-backed author repository.
pub struct SqliteAuthorRepository<'conn> {
    conn: &'conn mut Connection,
    tx_options: TxOptions,
}

impl<'conn> SqliteAuthorRepository<'conn> {
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

impl AuthorRepository for SqliteAuthorRepository<'_> {
    fn create_author(&mut self, author: &NewAuthor) -> RepoResult<Author> {
        author.validate()?;
        let name = author.name.trim().to_string();

        run_in_transaction(self.conn, &self.tx_options, |tx| -> RepoResult<Author> {
            let id = author_registry::resolve_or_create(tx, &name)?;
            Ok(Author { id, name })
        })
        .map_err(|err| err.in_operation(|| "create author".to_string()))
    }

    fn update_author(&mut self, id: AuthorId, author: &NewAuthor) -> RepoResult<Author> {
        author.validate()?;
        let name = author.name.trim().to_string();

        let renamed = run_in_transaction(
            self.conn,
            &self.tx_options,
            |tx| -> RepoResult<Author> {
                let changed = tx
                    .execute(
                        "UPDATE authors SET name = ?1 WHERE id = ?2;",
                        params![name, id],
                    )
                    .map_err(|err| {
                        if is_unique_violation(&err) {
                            RepoError::conflict(Entity::Author, "name", name.as_str())
                        } else {
                            err.into()
                        }
                    })?;
                if changed == 0 {
                    return Err(RepoError::not_found(Entity::Author, id));
                }
                Ok(Author { id, name })
            },
        )
        .map_err(|err| err.in_operation(|| format!("update author {id}")))?;

        info!("event=author_update module=repo status=ok author_id={id}");
        Ok(renamed)
    }

    fn delete_author(&mut self, id: AuthorId) -> RepoResult<()> {
        let unlinked = run_in_transaction(
            self.conn,
            &self.tx_options,
            |tx| -> RepoResult<usize> {
                let unlinked = relationship::unlink_author(tx, id)?;
                let deleted = tx.execute("DELETE FROM authors WHERE id = ?1;", [id])?;
                if deleted == 0 {
                    return Err(RepoError::not_found(Entity::Author, id));
                }
                Ok(unlinked)
            },
        )
        .map_err(|err| err.in_operation(|| format!("delete author {id}")))?;

        info!("event=author_delete module=repo status=ok author_id={id} unlinked={unlinked}");
        Ok(())
    }

    fn get_author(&self, id: AuthorId) -> RepoResult<Author> {
        self.conn
            .query_row(
                "SELECT id, name FROM authors WHERE id = ?1;",
                [id],
                |row| {
                    Ok(Author {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| RepoError::not_found(Entity::Author, id))
    }

    fn get_author_by_name(&self, name: &str) -> RepoResult<Author> {
        let name = name.trim();
        self.conn
            .query_row(
                "SELECT id, name FROM authors WHERE name = ?1;",
                [name],
                |row| {
                    Ok(Author {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| RepoError::not_found(Entity::Author, format!("name `{name}`")))
    }

    fn list_authors(&self) -> RepoResult<Vec<Author>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM authors ORDER BY name ASC, id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut authors = Vec::new();
        while let Some(row) = rows.next()? {
            authors.push(Author {
                id: row.get("id")?,
                name: row.get("name")?,
            });
        }

        if authors.is_empty() {
            return Err(RepoError::NoRows(Entity::Author));
        }
        Ok(authors)
    }

    fn list_author_names(&self) -> RepoResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM authors ORDER BY name ASC;")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        if names.is_empty() {
            return Err(RepoError::NoRows(Entity::Author));
        }
        Ok(names)
    }

    fn count_authors(&self) -> RepoResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM authors;", [], |row| row.get(0))?;
        usize::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative author count {count}")))
    }
}

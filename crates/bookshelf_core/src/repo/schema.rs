//! Connection readiness checks run when a repository is constructed.

use crate::db::migrations::{current_user_version, latest_version};
use crate::repo::error::{RepoError, RepoResult};
use rusqlite::Connection;

/// Tables and columns the book/author repositories read and write.
pub(crate) const CATALOG_TABLES: &[(&str, &[&str])] = &[
    (
        "books",
        &[
            "id",
            "title",
            "description",
            "isbn",
            "num_of_pages",
            "rating",
            "state",
            "added_at",
            "updated_at",
            "completed_at",
        ],
    ),
    ("authors", &["id", "name"]),
    ("books_authors", &["book_id", "author_id"]),
];

pub(crate) const USER_TABLES: &[(&str, &[&str])] = &[(
    "users",
    &[
        "id",
        "name",
        "username",
        "hashed_password",
        "role",
        "added_at",
    ],
)];

/// Fails unless `conn` is migrated to the latest version and has `tables`.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    tables: &[(&'static str, &[&'static str])],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &(table, columns) in tables {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

//! User repository contracts and SQLite implementation.
//!
//! # Invariants
//! - `username` is unique; duplicates surface as `Conflict`.
//! - `hashed_password` is stored verbatim.

use crate::db::{is_unique_violation, run_in_transaction, StoreConfig, TxOptions};
use crate::model::user::{NewUser, User, UserId};
use crate::repo::error::{Entity, RepoError, RepoResult};
use crate::repo::schema::{ensure_connection_ready, USER_TABLES};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};

const USER_SELECT_SQL: &str = "SELECT
    id,
    name,
    username,
    hashed_password,
    role,
    added_at
FROM users";

/// Repository interface for user operations.
pub trait UserRepository {
    fn create_user(&mut self, user: &NewUser) -> RepoResult<User>;
    fn update_user(&mut self, id: UserId, user: &NewUser) -> RepoResult<User>;
    fn delete_user(&mut self, id: UserId) -> RepoResult<()>;
    fn get_user(&self, id: UserId) -> RepoResult<User>;
    fn get_user_by_username(&self, username: &str) -> RepoResult<User>;
    /// Lists users ordered by id. `NoRows` when there are none.
    fn list_users(&self) -> RepoResult<Vec<User>>;
    fn count_users(&self) -> RepoResult<usize>;
}

/// SQLite-backed user repository.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn mut Connection,
    tx_options: TxOptions,
}

impl<'conn> SqliteUserRepository<'conn> {
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
        ensure_connection_ready(conn, USER_TABLES)?;
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

impl UserRepository for SqliteUserRepository<'_> {
    fn create_user(&mut self, user: &NewUser) -> RepoResult<User> {
        user.validate()?;
        let username = user.username.trim();

        let created = run_in_transaction(self.conn, &self.tx_options, |tx| -> RepoResult<User> {
            let (id, added_at) = tx
                .query_row(
                    "INSERT INTO users (name, username, hashed_password, role)
                     VALUES (?1, ?2, ?3, ?4)
                     RETURNING id, added_at;",
                    params![
                        user.name.trim(),
                        username,
                        user.hashed_password,
                        user.role.trim(),
                    ],
                    |row| Ok((row.get::<_, UserId>(0)?, row.get::<_, i64>(1)?)),
                )
                .map_err(|err| username_conflict(err, username))?;

            Ok(User {
                id,
                name: user.name.trim().to_string(),
                username: username.to_string(),
                hashed_password: user.hashed_password.clone(),
                role: user.role.trim().to_string(),
                added_at,
            })
        })
        .map_err(|err| err.in_operation(|| "create user".to_string()))?;

        info!(
            "event=user_create module=repo status=ok user_id={}",
            created.id
        );
        Ok(created)
    }

    fn update_user(&mut self, id: UserId, user: &NewUser) -> RepoResult<User> {
        user.validate()?;
        let username = user.username.trim();

        let updated = run_in_transaction(self.conn, &self.tx_options, |tx| -> RepoResult<User> {
            let changed = tx
                .execute(
                    "UPDATE users
                     SET name = ?1, username = ?2, hashed_password = ?3, role = ?4
                     WHERE id = ?5;",
                    params![
                        user.name.trim(),
                        username,
                        user.hashed_password,
                        user.role.trim(),
                        id,
                    ],
                )
                .map_err(|err| username_conflict(err, username))?;
            if changed == 0 {
                return Err(RepoError::not_found(Entity::User, id));
            }
            fetch_user(tx, id)
        })
        .map_err(|err| err.in_operation(|| format!("update user {id}")))?;

        info!("event=user_update module=repo status=ok user_id={id}");
        Ok(updated)
    }

    fn delete_user(&mut self, id: UserId) -> RepoResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1;", [id])
            .map_err(|err| RepoError::from(err).in_operation(|| format!("delete user {id}")))?;
        if deleted == 0 {
            return Err(RepoError::not_found(Entity::User, id));
        }

        info!("event=user_delete module=repo status=ok user_id={id}");
        Ok(())
    }

    fn get_user(&self, id: UserId) -> RepoResult<User> {
        fetch_user(self.conn, id)
    }

    fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
        let username = username.trim();
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE username = ?1;"))?;
        stmt.query_row([username], parse_user_row)
            .optional()?
            .ok_or_else(|| RepoError::not_found(Entity::User, format!("username `{username}`")))
    }

    fn list_users(&self) -> RepoResult<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} ORDER BY id ASC;"))?;
        let users = stmt
            .query_map([], parse_user_row)?
            .collect::<Result<Vec<_>, _>>()?;

        if users.is_empty() {
            return Err(RepoError::NoRows(Entity::User));
        }
        Ok(users)
    }

    fn count_users(&self) -> RepoResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users;", [], |row| row.get(0))?;
        usize::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative user count {count}")))
    }
}

fn fetch_user(conn: &Connection, id: UserId) -> RepoResult<User> {
    let mut stmt = conn.prepare(&format!("{USER_SELECT_SQL} WHERE id = ?1;"))?;
    stmt.query_row([id], parse_user_row)
        .optional()?
        .ok_or_else(|| RepoError::not_found(Entity::User, id))
}

fn parse_user_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        name: row.get("name")?,
        username: row.get("username")?,
        hashed_password: row.get("hashed_password")?,
        role: row.get("role")?,
        added_at: row.get("added_at")?,
    })
}

fn username_conflict(err: rusqlite::Error, username: &str) -> RepoError {
    if is_unique_violation(&err) {
        RepoError::conflict(Entity::User, "username", username)
    } else {
        err.into()
    }
}

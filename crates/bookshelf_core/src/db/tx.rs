//! Transaction runner for multi-statement units of work.
//!
//! # Responsibility
//! - Pair transaction acquisition with exactly one release: commit on a clean
//!   return, rollback on error, deadline expiry or unwinding.
//! - Hand the unit of work's result straight back to the caller.
//!
//! # Invariants
//! - No retries happen here; callers see the raw outcome.
//! - A panic inside the unit of work rolls back (the `Transaction` guard is
//!   dropped while unwinding) and keeps propagating.
//! - When a deadline is set, SQLite is interrupted once it elapses and the
//!   work is never committed past it.
//! - The deadline includes lock acquisition: `BEGIN` waits on the write lock
//!   for at most the deadline, never the full connection busy timeout.
//!   Lock waits inside a deferred transaction are bounded by the busy
//!   timeout only.

use super::config::StoreConfig;
use super::DbError;
use log::{debug, warn};
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Number of SQLite VM instructions between deadline checks.
const DEADLINE_CHECK_OPS: i32 = 100;

/// Lock acquisition mode for a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxBehavior {
    /// Take the write lock lazily on first write.
    Deferred,
    /// Take the write lock at `BEGIN`, serializing writers up front.
    #[default]
    Immediate,
}

impl From<TxBehavior> for TransactionBehavior {
    fn from(value: TxBehavior) -> Self {
        match value {
            TxBehavior::Deferred => TransactionBehavior::Deferred,
            TxBehavior::Immediate => TransactionBehavior::Immediate,
        }
    }
}

/// Per-transaction options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    pub behavior: TxBehavior,
    /// Abort and roll back once this much time has passed since `BEGIN`.
    pub deadline: Option<Duration>,
}

impl TxOptions {
    /// Returns a copy of these options with `deadline` set.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

impl From<&StoreConfig> for TxOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            behavior: TxBehavior::Immediate,
            deadline: config.tx_deadline,
        }
    }
}

/// Runs `work` inside one transaction on `conn`.
///
/// Returns whatever `work` returns on success once the commit succeeds.
///
/// # Errors
/// - Errors from `BEGIN`/`COMMIT` are converted through `From<DbError>`.
/// - Errors from `work` are returned unchanged after rollback, unless the
///   deadline interrupted SQLite, in which case `DbError::DeadlineExceeded`
///   is returned instead.
pub fn run_in_transaction<T, E, F>(
    conn: &mut Connection,
    options: &TxOptions,
    work: F,
) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<DbError>,
{
    let started_at = Instant::now();
    let restore_busy = match options.deadline {
        Some(limit) => cap_busy_wait(conn, limit).map_err(|err| E::from(DbError::from(err)))?,
        None => None,
    };

    let begun = conn.transaction_with_behavior(options.behavior.into());
    let tx = match begun {
        Ok(tx) => {
            if let Some(busy_timeout) = restore_busy {
                restore_busy_wait(&tx, busy_timeout);
            }
            tx
        }
        Err(_) => {
            // Consume `begun` whole so its borrow of `conn` ends here.
            let Some(err) = begun.err() else {
                unreachable!("matched Err")
            };
            if let Some(busy_timeout) = restore_busy {
                restore_busy_wait(conn, busy_timeout);
            }
            let capped = restore_busy.is_some();
            return Err(E::from(begin_failure(
                err,
                started_at,
                options.deadline,
                capped,
            )));
        }
    };

    let (outcome, interrupted) = {
        let watchdog = DeadlineWatchdog::install(&tx, started_at, options.deadline);
        let outcome = work(&tx);
        (outcome, watchdog.fired())
    };

    let expired = options
        .deadline
        .filter(|limit| interrupted || started_at.elapsed() >= *limit);

    match (outcome, expired) {
        (Ok(value), None) => {
            tx.commit().map_err(|err| E::from(DbError::from(err)))?;
            debug!(
                "event=tx_commit module=db status=ok duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(value)
        }
        (outcome, Some(limit)) => {
            rollback(tx, "deadline_exceeded");
            // A unit of work that failed on its own before the deadline keeps
            // its error; only interruption and late success are rewritten.
            match outcome {
                Err(err) if !interrupted => Err(err),
                _ => Err(E::from(DbError::DeadlineExceeded(limit))),
            }
        }
        (Err(err), None) => {
            rollback(tx, "work_failed");
            Err(err)
        }
    }
}

/// Lowers the busy timeout of `conn` to `deadline` when it is longer.
///
/// Returns the busy timeout to restore once `BEGIN` has returned.
fn cap_busy_wait(conn: &Connection, deadline: Duration) -> rusqlite::Result<Option<Duration>> {
    let busy_ms: i64 = conn.query_row("PRAGMA busy_timeout;", [], |row| row.get(0))?;
    let busy_timeout = Duration::from_millis(u64::try_from(busy_ms).unwrap_or(0));
    if busy_timeout <= deadline {
        return Ok(None);
    }
    conn.busy_timeout(deadline)?;
    Ok(Some(busy_timeout))
}

fn restore_busy_wait(conn: &Connection, busy_timeout: Duration) {
    if let Err(err) = conn.busy_timeout(busy_timeout) {
        warn!(
            "event=tx_busy_restore module=db status=error busy_timeout_ms={} error={}",
            busy_timeout.as_millis(),
            err
        );
    }
}

/// Maps a failed `BEGIN`. Running out of the deadline while waiting for the
/// write lock is reported as `DeadlineExceeded`. `capped` means the busy
/// wait was shortened to the deadline.
fn begin_failure(
    err: rusqlite::Error,
    started_at: Instant,
    deadline: Option<Duration>,
    capped: bool,
) -> DbError {
    let lock_busy = matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    );
    match deadline {
        Some(limit) if (capped && lock_busy) || started_at.elapsed() >= limit => {
            warn!(
                "event=tx_begin module=db status=error reason=deadline_exceeded waited_ms={}",
                started_at.elapsed().as_millis()
            );
            DbError::DeadlineExceeded(limit)
        }
        _ => DbError::from(err),
    }
}

fn rollback(tx: Transaction<'_>, reason: &str) {
    match tx.rollback() {
        Ok(()) => warn!("event=tx_rollback module=db status=ok reason={reason}"),
        Err(err) => warn!(
            "event=tx_rollback module=db status=error reason={} error={}",
            reason, err
        ),
    }
}

/// Interrupts SQLite when the deadline passes. Removes its progress handler
/// on drop, including while unwinding.
struct DeadlineWatchdog<'a> {
    conn: &'a Connection,
    fired: Arc<AtomicBool>,
}

impl<'a> DeadlineWatchdog<'a> {
    fn install(conn: &'a Connection, started_at: Instant, deadline: Option<Duration>) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        if let Some(limit) = deadline {
            let expires_at = started_at + limit;
            let flag = Arc::clone(&fired);
            conn.progress_handler(
                DEADLINE_CHECK_OPS,
                Some(move || {
                    if Instant::now() >= expires_at {
                        flag.store(true, Ordering::SeqCst);
                        true
                    } else {
                        false
                    }
                }),
            );
        }
        Self { conn, fired }
    }

    fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for DeadlineWatchdog<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}

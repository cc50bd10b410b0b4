use bookshelf_core::db::{
    open_db, open_db_in_memory, open_db_with_config, run_in_transaction, DbError, StoreConfig,
    TxBehavior, TxOptions,
};
use bookshelf_core::{
    BookRepository, NewBook, RepoError, RepoErrorKind, RepoResult, SqliteBookRepository,
};
use rusqlite::Connection;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

fn author_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM authors;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn successful_work_commits_and_returns_its_value() {
    let mut conn = open_db_in_memory().unwrap();

    let id = run_in_transaction(&mut conn, &TxOptions::default(), |tx| -> RepoResult<i64> {
        tx.execute("INSERT INTO authors (name) VALUES ('Ken Adams');", [])?;
        Ok(tx.last_insert_rowid())
    })
    .unwrap();

    assert!(id > 0);
    assert_eq!(author_count(&conn), 1);
    assert!(conn.is_autocommit());
}

#[test]
fn failing_work_rolls_back_and_returns_the_same_error() {
    let mut conn = open_db_in_memory().unwrap();

    let err = run_in_transaction(&mut conn, &TxOptions::default(), |tx| -> RepoResult<()> {
        tx.execute("INSERT INTO authors (name) VALUES ('Ken Adams');", [])?;
        Err(RepoError::InvalidData("stop here".to_string()))
    })
    .unwrap_err();

    assert!(matches!(err, RepoError::InvalidData(ref message) if message == "stop here"));
    assert_eq!(author_count(&conn), 0);
    assert!(conn.is_autocommit());
}

#[test]
fn panicking_work_rolls_back_and_keeps_unwinding() {
    let mut conn = open_db_in_memory().unwrap();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _ = run_in_transaction(&mut conn, &TxOptions::default(), |tx| -> RepoResult<()> {
            tx.execute("INSERT INTO authors (name) VALUES ('Ken Adams');", [])?;
            panic!("boom");
        });
    }));

    let payload = outcome.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));
    assert_eq!(author_count(&conn), 0);
    assert!(conn.is_autocommit());
}

#[test]
fn expired_deadline_rolls_back_successful_work() {
    let mut conn = open_db_in_memory().unwrap();
    let options = TxOptions::default().with_deadline(Duration::ZERO);

    let err = run_in_transaction(&mut conn, &options, |tx| -> RepoResult<()> {
        tx.execute("INSERT INTO authors (name) VALUES ('Ken Adams');", [])?;
        Ok(())
    })
    .unwrap_err();

    assert!(matches!(
        err,
        RepoError::Db {
            source: DbError::DeadlineExceeded(_),
            ..
        }
    ));
    assert!(err.is_transient());
    assert_eq!(author_count(&conn), 0);
}

#[test]
fn deadline_interrupts_long_running_statements() {
    let mut conn = open_db_in_memory().unwrap();
    let options = TxOptions::default().with_deadline(Duration::from_millis(50));

    let err = run_in_transaction(&mut conn, &options, |tx| -> RepoResult<i64> {
        tx.execute("INSERT INTO authors (name) VALUES ('Ken Adams');", [])?;
        let total = tx.query_row(
            "WITH RECURSIVE counter(n) AS (
                SELECT 1 UNION ALL SELECT n + 1 FROM counter WHERE n < 1000000000
             )
             SELECT SUM(n) FROM counter;",
            [],
            |row| row.get(0),
        )?;
        Ok(total)
    })
    .unwrap_err();

    assert_eq!(err.kind(), RepoErrorKind::Transient);
    assert!(err.to_string().contains("deadline"));
    assert_eq!(author_count(&conn), 0);
}

#[test]
fn deferred_transactions_commit_like_immediate_ones() {
    let mut conn = open_db_in_memory().unwrap();
    let options = TxOptions {
        behavior: TxBehavior::Deferred,
        deadline: None,
    };

    run_in_transaction(&mut conn, &options, |tx| -> RepoResult<()> {
        tx.execute("INSERT INTO authors (name) VALUES ('Ken Adams');", [])?;
        Ok(())
    })
    .unwrap();

    assert_eq!(author_count(&conn), 1);
}

#[test]
fn repository_writes_honor_configured_deadline() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBookRepository::try_new(&mut conn)
        .unwrap()
        .with_tx_options(TxOptions::default().with_deadline(Duration::ZERO));

    let err = repo
        .create_book(&NewBook::new("Late", "1", ["Ken Adams"]))
        .unwrap_err();
    assert!(err.is_transient());
    assert!(err.to_string().starts_with("db: create book failed"));
    assert_eq!(author_count(&conn), 0);
}

#[test]
fn repository_deadline_comes_from_store_config() {
    let mut conn = open_db_in_memory().unwrap();
    let config = StoreConfig {
        tx_deadline: Some(Duration::ZERO),
        ..StoreConfig::default()
    };

    let err = SqliteBookRepository::try_new_with_config(&mut conn, &config)
        .unwrap()
        .create_book(&NewBook::new("Late", "1", ["Ken Adams"]))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Db {
            source: DbError::DeadlineExceeded(_),
            ..
        }
    ));
    assert_eq!(author_count(&conn), 0);
}

#[test]
fn disabled_deadline_lets_a_write_wait_out_a_long_lock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.db");
    let config = StoreConfig {
        busy_timeout: Duration::from_secs(10),
        tx_deadline: None,
    };

    let holder = open_db_with_config(&path, &config).unwrap();
    holder.execute_batch("BEGIN IMMEDIATE;").unwrap();
    let release = thread::spawn(move || {
        thread::sleep(Duration::from_millis(3500));
        holder.execute_batch("COMMIT;").unwrap();
    });

    let mut conn = open_db_with_config(&path, &config).unwrap();
    let started_at = Instant::now();
    let created = SqliteBookRepository::try_new_with_config(&mut conn, &config)
        .unwrap()
        .create_book(&NewBook::new("Patient", "1", ["Ken Adams"]));
    release.join().unwrap();

    assert!(created.is_ok(), "unexpected error: {:?}", created.err());
    assert!(started_at.elapsed() >= Duration::from_secs(3));
    assert_eq!(author_count(&conn), 1);
}

#[test]
fn lock_wait_is_bounded_by_the_deadline_not_the_busy_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.db");
    let holder = open_db(&path).unwrap();
    holder.execute_batch("BEGIN IMMEDIATE;").unwrap();

    let mut conn = open_db_with_config(
        &path,
        &StoreConfig {
            busy_timeout: Duration::from_secs(5),
            tx_deadline: None,
        },
    )
    .unwrap();
    let options = TxOptions::default().with_deadline(Duration::from_millis(200));

    let started_at = Instant::now();
    let err = run_in_transaction(&mut conn, &options, |tx| -> RepoResult<()> {
        tx.execute("INSERT INTO authors (name) VALUES ('Ken Adams');", [])?;
        Ok(())
    })
    .unwrap_err();

    assert!(started_at.elapsed() < Duration::from_secs(2));
    assert!(matches!(
        err,
        RepoError::Db {
            source: DbError::DeadlineExceeded(_),
            ..
        }
    ));
    let busy_ms: i64 = conn
        .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(busy_ms, 5000);

    holder.execute_batch("ROLLBACK;").unwrap();
    assert_eq!(author_count(&conn), 0);
}

//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `bookshelf_core` linkage with deterministic output.
//! - Given a database path, open (and migrate) the catalog and print counts.
//!
//! Usage: `bookshelf_cli [DB_PATH [LOG_DIR]]`

use bookshelf_core::{
    AuthorRepository, BookRepository, RepoError, SqliteAuthorRepository, SqliteBookRepository,
    SqliteUserRepository, UserRepository,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("bookshelf_core ping={}", bookshelf_core::ping());
    println!("bookshelf_core version={}", bookshelf_core::core_version());

    let mut args = std::env::args().skip(1);
    let Some(db_path) = args.next() else {
        return ExitCode::SUCCESS;
    };

    if let Some(log_dir) = args.next() {
        if let Err(err) = bookshelf_core::init_logging(bookshelf_core::default_log_level(), &log_dir)
        {
            eprintln!("logging disabled: {err}");
        }
    }

    match print_counts(&db_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("event=cli_probe module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn print_counts(db_path: &str) -> Result<(), RepoError> {
    let mut conn = bookshelf_core::open_db(db_path)?;

    let books = SqliteBookRepository::try_new(&mut conn)?.count_books()?;
    let authors = SqliteAuthorRepository::try_new(&mut conn)?.count_authors()?;
    let users = SqliteUserRepository::try_new(&mut conn)?.count_users()?;

    println!("catalog books={books} authors={authors} users={users}");
    log::info!(
        "event=cli_probe module=cli status=ok books={} authors={} users={}",
        books,
        authors,
        users
    );
    Ok(())
}

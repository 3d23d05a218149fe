//! SQLite connection pool with WAL mode.
//!
//! The sync engine writes from a single task while other components read
//! concurrently, so the pool runs in WAL mode with a generous busy timeout.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;

pub type DbPool = Pool<Sqlite>;

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Open (creating the file if needed) a WAL-mode pool on `db_path`.
///
/// The parent directory must exist.
pub async fn create_pool(db_path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        // First start creates the file
        .create_if_missing(true)
        // Readers never block the sync writer
        .journal_mode(SqliteJournalMode::Wal)
        // Durable enough under WAL, and far fewer fsyncs
        .synchronous(SqliteSynchronous::Normal)
        // Wait out a concurrent writer instead of failing with SQLITE_BUSY
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        // One writer plus a few readers
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
}

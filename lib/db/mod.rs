use diesel::connection::SimpleConnection;
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::outbox::StoreError;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Opens the outbox database, applies pragmas, and runs pending migrations.
///
/// `path` may be `:memory:` for tests. WAL keeps the append path crash-safe:
/// a torn write never surfaces as a half-written row, the transaction is
/// simply absent after reopen.
pub fn open_outbox_database(path: &str) -> Result<SqliteConnection, StoreError> {
    let mut conn = SqliteConnection::establish(path).map_err(|err| StoreError::Open {
        path: path.to_string(),
        message: err.to_string(),
    })?;

    conn.batch_execute(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        "#,
    )?;

    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| StoreError::Migration(err.to_string()))?;

    Ok(conn)
}

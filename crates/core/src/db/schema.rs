//! Database schema and migration runner.
//!
//! Migrations are applied in order; the SQLite `user_version` pragma records
//! the last one applied.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::StorageError;

/// All migrations, in order, as `(version, description, sql)`.
static MIGRATIONS: &[(u32, &str, &str)] = &[(
    1,
    "companies, members and ledger",
    r#"
    CREATE TABLE IF NOT EXISTS companies (
        id            TEXT PRIMARY KEY,
        position      INTEGER NOT NULL,
        company_name  TEXT NOT NULL,
        balance       REAL NOT NULL CHECK (balance >= 0)
    );

    CREATE INDEX IF NOT EXISTS idx_companies_position ON companies (position);

    CREATE TABLE IF NOT EXISTS members (
        company_id        TEXT NOT NULL REFERENCES companies (id) ON DELETE CASCADE,
        position          INTEGER NOT NULL,
        email             TEXT NOT NULL,
        redemption_token  TEXT NOT NULL DEFAULT '',
        redemption_code   TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (company_id, position),
        UNIQUE (company_id, email)
    );

    CREATE TABLE IF NOT EXISTS transactions (
        seq                      INTEGER PRIMARY KEY AUTOINCREMENT,
        id                       TEXT NOT NULL UNIQUE,
        date                     TEXT NOT NULL,
        amount                   REAL NOT NULL,
        kind                     TEXT NOT NULL CHECK (kind IN
                                   ('purchase', 'recharge', 'settlement', 'cancelation', 'refund')),
        user_id                  TEXT NOT NULL DEFAULT '',
        company_id               TEXT NOT NULL DEFAULT '',
        card_id                  TEXT,
        error                    TEXT,
        original_transaction_id  TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_transactions_company ON transactions (company_id);
    CREATE INDEX IF NOT EXISTS idx_transactions_original ON transactions (original_transaction_id);
    "#,
)];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    let current_version = get_schema_version(conn)?;
    info!(
        current_version,
        target_version = MIGRATIONS.last().map(|m| m.0).unwrap_or(0),
        "checking database migrations"
    );

    for &(version, description, sql) in MIGRATIONS {
        if version > current_version {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| StorageError::MigrationFailed {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied");
        }
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<u32, StorageError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<(), StorageError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

//! Database module for SQLite persistence.
//!
//! The harvester owns registries, metadata formats, templates and records;
//! the explore platform owns saved queries. This service reads all of them and
//! writes only the data-source list of a saved query.

mod repository;
mod sql;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS registries (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            is_activated INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS templates (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            hash TEXT NOT NULL DEFAULT ''
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metadata_formats (
            id INTEGER PRIMARY KEY,
            registry_id INTEGER NOT NULL REFERENCES registries(id),
            metadata_prefix TEXT NOT NULL,
            hash TEXT NOT NULL DEFAULT '',
            template_id INTEGER REFERENCES templates(id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY,
            identifier TEXT NOT NULL,
            metadata_format_id INTEGER NOT NULL REFERENCES metadata_formats(id),
            xml_content TEXT NOT NULL DEFAULT '',
            dict_content TEXT NOT NULL DEFAULT '{}',
            deleted INTEGER NOT NULL DEFAULT 0,
            last_modification_date TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queries (
            id INTEGER PRIMARY KEY,
            user_id TEXT NOT NULL,
            data_sources TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_registries_activated ON registries(is_activated, name);
        CREATE INDEX IF NOT EXISTS idx_metadata_formats_registry ON metadata_formats(registry_id);
        CREATE INDEX IF NOT EXISTS idx_records_format ON records(metadata_format_id, deleted);
        CREATE INDEX IF NOT EXISTS idx_records_identifier ON records(identifier);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

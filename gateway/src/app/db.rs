//! SQLite pool setup, embedded migrations and the small key/value table.

use core::str::FromStr as _;

use eyre::WrapErr as _;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tracing::info;

pub type DbPool = SqlitePool;

/// Key under which a generated cookie signing key is persisted.
pub const KV_COOKIE_SECRET: &str = "cookie_secret";

const IN_MEMORY_URLS: [&str; 2] = ["sqlite::memory:", "sqlite://:memory:"];

/// Open the database and run all pending migrations.
///
/// An in-memory database is pinned to a single connection that never expires, otherwise every new
/// pool connection would see its own empty database.
///
/// # Errors
///
/// Returns an error if the URL is malformed, the database cannot be opened, or a migration fails.
#[tracing::instrument(skip_all)]
pub async fn init(url: &str) -> eyre::Result<DbPool> {
    let in_memory = IN_MEMORY_URLS.contains(&url);

    let options = SqliteConnectOptions::from_str(url)
        .wrap_err_with(|| format!("invalid database url: {url}"))?
        .create_if_missing(true);

    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
    } else {
        SqlitePoolOptions::new()
            .connect_with(options.journal_mode(SqliteJournalMode::Wal))
            .await
    }
    .wrap_err("failed to open database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .wrap_err("failed to run database migrations")?;

    info!(in_memory, "Database ready");
    Ok(pool)
}

/// Cheap liveness probe used by the health endpoint.
///
/// # Errors
///
/// Returns the underlying database error if the query fails.
pub async fn ping(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await
        .map(drop)
}

/// # Errors
///
/// Returns an error if the query fails.
pub async fn get_kv(pool: &DbPool, key: &str) -> eyre::Result<Option<String>> {
    sqlx::query_scalar::<_, String>("SELECT value FROM kv WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .wrap_err_with(|| format!("failed to read kv entry {key}"))
}

/// # Errors
///
/// Returns an error if the query fails.
pub async fn store_kv(pool: &DbPool, key: &str, value: &str) -> eyre::Result<()> {
    sqlx::query(
        "INSERT INTO kv (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("failed to store kv entry {key}"))?;
    Ok(())
}

/// # Errors
///
/// Returns an error if the query fails.
pub async fn delete_kv(pool: &DbPool, key: &str) -> eyre::Result<()> {
    sqlx::query("DELETE FROM kv WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await
        .wrap_err_with(|| format!("failed to delete kv entry {key}"))?;
    Ok(())
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::config::DbConfig;

/// Build a connection pool for the configured database.
pub async fn create_pool(cfg: &DbConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&cfg.database_url)
        .await
        .with_context(|| format!("connecting to {}", cfg.database_url))
}

/// Run all pending migrations found under `migrations_dir` against `pool`.
///
/// Uses a runtime [`Migrator`] rather than the `sqlx::migrate!()` macro so
/// that building this crate never requires a live database connection.
pub async fn run_migrations(pool: &PgPool, migrations_dir: &Path) -> Result<()> {
    let migrator = Migrator::new(migrations_dir)
        .await
        .with_context(|| format!("loading migrations from {}", migrations_dir.display()))?;
    migrator
        .run(pool)
        .await
        .context("applying migrations")?;
    Ok(())
}

/// The `migrations/` directory shipped alongside this crate.
pub fn default_migrations_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

/// Create the target database if it does not already exist.
///
/// Connects to the `postgres` maintenance database to issue `CREATE
/// DATABASE`, since a database cannot create itself. Database names cannot
/// be parameterized in SQL, so the name is validated against a restrictive
/// character set before being interpolated into the statement.
pub async fn ensure_database_exists(cfg: &DbConfig) -> Result<()> {
    let db_name = cfg
        .database_name()
        .context("database URL has no database name")?;

    if !db_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        anyhow::bail!("refusing to create database with unsafe name: {db_name:?}");
    }

    let maintenance_pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&cfg.maintenance_url())
        .await
        .context("connecting to maintenance database")?;

    let exists: bool = sqlx::query("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(db_name)
        .fetch_one(&maintenance_pool)
        .await
        .context("checking pg_database")?
        .get(0);

    if !exists {
        let stmt = format!("CREATE DATABASE \"{db_name}\"");
        sqlx::query(&stmt)
            .execute(&maintenance_pool)
            .await
            .with_context(|| format!("creating database {db_name}"))?;
    }

    Ok(())
}

/// Row counts for every table this crate owns, keyed by table name. Used by
/// diagnostics commands and migration tests.
pub async fn table_counts(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    const TABLES: &[&str] = &["jobs", "tasks", "artifacts", "prompts", "system_events"];
    let mut counts = Vec::with_capacity(TABLES.len());
    for table in TABLES {
        let stmt = format!("SELECT count(*) FROM {table}");
        let count: i64 = sqlx::query(&stmt).fetch_one(pool).await?.get(0);
        counts.push(((*table).to_owned(), count));
    }
    Ok(counts)
}

//! Database initialization
//!
//! Opens (or creates) the gridmap database and makes sure every table the
//! datadump workflow touches exists. Table creation is idempotent.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Foreign keys are set per connection, so they go on the connect options
    // rather than a one-off PRAGMA against the pool.
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema.
///
/// Limited to one connection that is never recycled: every connection to
/// `sqlite::memory:` is a separate database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_network_tables(pool).await?;
    create_reference_tables(pool).await?;
    create_connection_request_tables(pool).await?;
    create_scenario_tables(pool).await?;
    Ok(())
}

async fn create_network_tables(pool: &SqlitePool) -> Result<()> {
    // default_scenario_id references scenarios, created further down
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS networks (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            default_scenario_id TEXT REFERENCES scenarios(id) ON DELETE SET NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS network_buses (
            id TEXT PRIMARY KEY,
            net_id TEXT NOT NULL REFERENCES networks(id) ON DELETE CASCADE,
            number TEXT NOT NULL,
            name TEXT NOT NULL,
            lat REAL,
            lon REAL,
            UNIQUE(number, net_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Deduplicated reference rows; never updated or deleted by the importer
async fn create_reference_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            full_name TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS organizations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS admin_geo (
            id TEXT PRIMARY KEY,
            code INTEGER,
            level0_code TEXT,
            level0_name TEXT,
            level1_code INTEGER,
            level2_code INTEGER,
            level2_name TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS internal_geo (
            id TEXT PRIMARY KEY,
            level1_code TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_connection_request_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS connection_requests (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            bus_id TEXT NOT NULL REFERENCES network_buses(id) ON DELETE CASCADE,
            status TEXT NOT NULL,
            connection_kind TEXT NOT NULL,
            connection_energy_kind TEXT NOT NULL,
            power_total REAL NOT NULL,
            power_increase REAL NOT NULL,
            created_at TEXT NOT NULL,
            date_desired TEXT NOT NULL,
            lat REAL,
            lon REAL,
            h3_ix TEXT,
            extra TEXT,
            admin_geo_id TEXT REFERENCES admin_geo(id),
            internal_geo_id TEXT REFERENCES internal_geo(id),
            account_manager_id TEXT REFERENCES users(id),
            grid_analyst_id TEXT REFERENCES users(id),
            org_id TEXT REFERENCES organizations(id),
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(project_id, bus_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_connection_requests_h3_ix ON connection_requests(h3_ix)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS milestones (
            id TEXT PRIMARY KEY,
            connection_request_id TEXT NOT NULL
                REFERENCES connection_requests(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            value TEXT NOT NULL,
            reason TEXT NOT NULL,
            datetime TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_scenario_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scenarios (
            id TEXT PRIMARY KEY,
            net_id TEXT NOT NULL REFERENCES networks(id) ON DELETE CASCADE,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            priority INTEGER,
            state TEXT,
            author_id TEXT REFERENCES users(id),
            created_at TEXT NOT NULL,
            solver_task_id TEXT,
            solver_task_status TEXT,
            solver_task_status_reason TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(code, net_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scenario_requests (
            scenario_id TEXT NOT NULL REFERENCES scenarios(id) ON DELETE CASCADE,
            connection_request_id TEXT NOT NULL
                REFERENCES connection_requests(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            PRIMARY KEY (scenario_id, connection_request_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scenarios_solver_task_id ON scenarios(solver_task_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

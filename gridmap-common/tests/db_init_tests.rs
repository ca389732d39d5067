//! Tests for database initialization
//!
//! Verifies file creation, idempotent schema creation and the cascade rules
//! the datadump workflow relies on.

use gridmap_common::db::init::{init_database, init_memory_database};
use gridmap_common::db::networks::{create_network, insert_bus};
use std::path::PathBuf;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("gridmap.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path: PathBuf = dir.path().join("gridmap.db");

    let pool1 = init_database(&db_path).await.unwrap();
    {
        let mut conn = pool1.acquire().await.unwrap();
        create_network(&mut conn, "persisted").await.unwrap();
    }
    pool1.close().await;

    // Second open must keep existing rows
    let pool2 = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM networks")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_all_tables_created() {
    let pool = init_memory_database().await.unwrap();

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(&pool)
            .await
            .unwrap();

    for expected in [
        "admin_geo",
        "connection_requests",
        "internal_geo",
        "milestones",
        "network_buses",
        "networks",
        "organizations",
        "scenario_requests",
        "scenarios",
        "users",
    ] {
        assert!(
            tables.iter().any(|t| t == expected),
            "missing table {}: {:?}",
            expected,
            tables
        );
    }
}

#[tokio::test]
async fn test_deleting_bus_cascades_to_connection_requests() {
    let pool = init_memory_database().await.unwrap();
    let mut conn = pool.acquire().await.unwrap();

    let net = create_network(&mut conn, "cascade").await.unwrap();
    let bus = insert_bus(&mut conn, net.id, "B1", "bus", None).await.unwrap();

    sqlx::query(
        r#"
        INSERT INTO connection_requests (
            id, project_id, bus_id, status, connection_kind, connection_energy_kind,
            power_total, power_increase, created_at, date_desired
        ) VALUES ('cr-1', 'P1', ?, '1_request', 'new', 'production', 1.0, 1.0, 'now', 'now')
        "#,
    )
    .bind(bus.id.to_string())
    .execute(&mut *conn)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO milestones (id, connection_request_id, position, value, reason, datetime) \
         VALUES ('m-1', 'cr-1', 0, 'v', 'r', 'now')",
    )
    .execute(&mut *conn)
    .await
    .unwrap();

    sqlx::query("DELETE FROM network_buses WHERE id = ?")
        .bind(bus.id.to_string())
        .execute(&mut *conn)
        .await
        .unwrap();

    let requests: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM connection_requests")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    let milestones: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM milestones")
        .fetch_one(&mut *conn)
        .await
        .unwrap();

    assert_eq!(requests, 0);
    assert_eq!(milestones, 0);
}

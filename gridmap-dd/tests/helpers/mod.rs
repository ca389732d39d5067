//! Test Helper Utilities
//!
//! Shared fixtures for the import/export integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use gridmap_common::db::init::init_database;
use gridmap_common::db::models::{
    ConnectionEnergyKind, ConnectionKind, ConnectionStatus, Network,
};
use gridmap_common::db::networks::{create_network, insert_bus};
use gridmap_common::{Error, Result};
use gridmap_dd::jobs::JobQueue;
use gridmap_dd::schemas::{
    AdminGeoDoc, ConnectionRequestDoc, ConnectionRequestRef, ConnectivityNode, EmployeeDoc,
    ExtraKeys, InternalGeoDoc, MilestoneDoc, OrganizationDoc, ScenarioDoc,
};
use sqlx::SqlitePool;
use std::sync::Mutex;
use tempfile::TempDir;

/// Create a temporary file-backed database with the full schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("gridmap_test.db"))
        .await
        .unwrap();
    (temp_dir, pool)
}

/// Network with the given (number, point) buses
pub async fn seed_network(pool: &SqlitePool, buses: &[(&str, Option<(f64, f64)>)]) -> Network {
    let mut conn = pool.acquire().await.unwrap();
    let network = create_network(&mut conn, "Test grid").await.unwrap();
    for (number, point) in buses {
        insert_bus(&mut conn, network.id, number, &format!("Bus {}", number), *point)
            .await
            .unwrap();
    }
    network
}

/// The two-bus network used by most tests: B1 at (0, 0), B2 at (0, 0.01)
pub async fn seed_two_bus_network(pool: &SqlitePool) -> Network {
    seed_network(pool, &[("B1", Some((0.0, 0.0))), ("B2", Some((0.0, 0.01)))]).await
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Bus number each connection request with `project_id` is attached to
pub async fn bus_numbers_of(pool: &SqlitePool, project_id: &str) -> Vec<String> {
    sqlx::query_scalar(
        r#"
        SELECT b.number FROM connection_requests cr
        JOIN network_buses b ON b.id = cr.bus_id
        WHERE cr.project_id = ?
        ORDER BY b.number
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .unwrap()
}

pub async fn scenario_codes(pool: &SqlitePool, network: &Network) -> Vec<String> {
    sqlx::query_scalar("SELECT code FROM scenarios WHERE net_id = ? ORDER BY rowid")
        .bind(network.id.to_string())
        .fetch_all(pool)
        .await
        .unwrap()
}

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 9, 30, 0).unwrap()
}

/// Connection request with fixed timestamps and a named account manager
pub fn request(
    project_id: &str,
    node: Option<&str>,
    point: Option<(f64, f64)>,
) -> ConnectionRequestDoc {
    ConnectionRequestDoc {
        id: project_id.to_string(),
        created_date_time: at(1),
        date_desired: at(28),
        power_total: 10.0,
        power_increase: 2.5,
        status: ConnectionStatus::Request,
        connection_kind: ConnectionKind::New,
        connection_energy_kind: ConnectionEnergyKind::Production,
        admin_geo: AdminGeoDoc {
            code: Some(180),
            level0_code: Some("SE".to_string()),
            level0_name: Some("Sweden".to_string()),
            level1_code: Some(1),
            level2_code: None,
            level2_name: None,
        },
        connectivity_node: ConnectivityNode {
            id: node.map(str::to_string),
        },
        account_manager: EmployeeDoc {
            full_name: Some("Alex Berg".to_string()),
        },
        internal_geo: InternalGeoDoc {
            level1_code: Some("NORTH".to_string()),
        },
        grid_analyst: EmployeeDoc { full_name: None },
        organization: OrganizationDoc {
            name: "Acme Energy".to_string(),
        },
        extra: point.map(|(lat, lon)| ExtraKeys {
            capacity_limited_area: Some("no".to_string()),
            wsg84lat: Some(lat),
            wsg84lon: Some(lon),
            ..ExtraKeys::default()
        }),
        milestone: vec![
            MilestoneDoc {
                value: "applied".to_string(),
                reason: "received".to_string(),
                date_time: at(2),
            },
            MilestoneDoc {
                value: "reviewed".to_string(),
                reason: "capacity check".to_string(),
                date_time: at(3),
            },
        ],
    }
}

pub fn scenario(code: &str, refs: &[&str]) -> ScenarioDoc {
    ScenarioDoc {
        id: None,
        code: code.to_string(),
        name: format!("Scenario {}", code),
        priority: Some(1),
        created_date_time: at(4),
        state: Some(ConnectionStatus::Planning),
        author: Some(EmployeeDoc {
            full_name: Some("Kim Lund".to_string()),
        }),
        connection_requests_list: refs
            .iter()
            .map(|r| ConnectionRequestRef {
                ref_id: r.to_string(),
            })
            .collect(),
        net_id: None,
    }
}

/// Job queue that records revocation requests, optionally refusing them
#[derive(Default)]
pub struct RecordingQueue {
    pub cancelled: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingQueue {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

impl JobQueue for RecordingQueue {
    fn cancel(&self, job_id: &str) -> Result<()> {
        self.cancelled.lock().unwrap().push(job_id.to_string());
        if self.fail {
            return Err(Error::Internal("task queue unreachable".to_string()));
        }
        Ok(())
    }
}

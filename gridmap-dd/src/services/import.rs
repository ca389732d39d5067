//! Import/replace of a network's connection requests and scenarios
//!
//! **Workflow (one transaction):**
//! 1. Load the network and its buses; pick the spatial cell resolution
//! 2. Purge: revoke pending compute jobs, delete non-default scenarios and
//!    every connection request on the network's buses
//! 3. Insert connection requests in document order (unmatched ones are skipped)
//! 4. Insert scenarios with membership rebuilt from the rows inserted in 3
//! 5. Commit
//!
//! Network lookup and resolution selection run before the purge, so their
//! failures leave the database untouched. Any later error rolls back the
//! whole replace.

use crate::bus_matcher::match_bus;
use crate::jobs::{pending_jobs, JobQueue};
use crate::references::{ReferenceKey, ReferenceResolver};
use crate::schemas::{ConnectionRequestDoc, ScenarioDoc, UnifiedDocument};
use crate::spatial::{point_to_cell, resolution_for_buses};
use gridmap_common::db::models::{Bus, Network};
use gridmap_common::db::networks::{load_buses, load_network};
use gridmap_common::Result;
use h3o::Resolution;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of one import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub inserted_connections: usize,
    pub skipped_connections: usize,
    pub inserted_scenarios: usize,
}

/// Rows removed by the purge step
#[derive(Debug, Default)]
struct PurgeStats {
    jobs_revoked: usize,
    scenarios_deleted: u64,
    connections_deleted: u64,
}

/// Project id -> connection request rows inserted for it in this run
type InsertedRequests<'a> = HashMap<&'a str, Vec<Uuid>>;

pub struct ImportService {
    db: SqlitePool,
    queue: Arc<dyn JobQueue>,
}

impl ImportService {
    pub fn new(db: SqlitePool, queue: Arc<dyn JobQueue>) -> Self {
        Self { db, queue }
    }

    /// Replace the network's connection requests and scenarios with `document`.
    ///
    /// `max_bus_distance_m` enables nearest-bus matching for records without
    /// a known bus number.
    pub async fn import_unified(
        &self,
        net_id: Uuid,
        document: &UnifiedDocument,
        max_bus_distance_m: Option<f64>,
    ) -> Result<ImportStats> {
        let start = Instant::now();
        info!(
            net_id = %net_id,
            connection_requests = document.requests().len(),
            scenarios = document.scenarios().len(),
            max_bus_distance_m = ?max_bus_distance_m,
            "Starting import"
        );

        let resolver = ReferenceResolver::new();
        let result = self
            .replace(net_id, document, max_bus_distance_m, &resolver)
            .await;
        resolver.clear().await;

        match &result {
            Ok(stats) => info!(
                net_id = %net_id,
                inserted_connections = stats.inserted_connections,
                skipped_connections = stats.skipped_connections,
                inserted_scenarios = stats.inserted_scenarios,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Import complete"
            ),
            Err(e) => error!(net_id = %net_id, error = %e, "Import failed, changes rolled back"),
        }

        result
    }

    async fn replace(
        &self,
        net_id: Uuid,
        document: &UnifiedDocument,
        max_bus_distance_m: Option<f64>,
        resolver: &ReferenceResolver,
    ) -> Result<ImportStats> {
        let mut tx = self.db.begin().await?;

        let network = load_network(&mut tx, net_id).await?;
        let buses = load_buses(&mut tx, net_id).await?;
        let resolution = resolution_for_buses(&buses)?;
        let default_code = default_scenario_code(&mut tx, &network).await?;

        let purged = self.purge(&mut tx, &network).await?;
        info!(
            net_id = %net_id,
            jobs_revoked = purged.jobs_revoked,
            scenarios_deleted = purged.scenarios_deleted,
            connections_deleted = purged.connections_deleted,
            "Purged previous import"
        );

        let mut stats = ImportStats::default();
        let mut inserted: InsertedRequests = HashMap::new();

        for record in document.requests() {
            let bus = match match_bus(record, &buses, max_bus_distance_m) {
                Ok(matched) => matched.bus(),
                Err(reason) => {
                    stats.skipped_connections += 1;
                    warn!(project_id = %record.id, reason = %reason, "Skipped connection request");
                    continue;
                }
            };

            let id = insert_connection_request(&mut tx, resolver, record, bus, resolution).await?;
            inserted.entry(record.id.as_str()).or_default().push(id);
            stats.inserted_connections += 1;
        }

        for scenario in document.scenarios() {
            if Some(scenario.code.as_str()) == default_code.as_deref() {
                debug!(code = %scenario.code, "Default scenario in document left unchanged");
                continue;
            }

            insert_scenario(&mut tx, resolver, network.id, scenario, &inserted).await?;
            stats.inserted_scenarios += 1;
        }

        tx.commit().await?;
        Ok(stats)
    }

    async fn purge(&self, conn: &mut SqliteConnection, network: &Network) -> Result<PurgeStats> {
        let mut stats = PurgeStats::default();

        for job in pending_jobs(conn, network).await? {
            match self.queue.cancel(&job.job_id) {
                Ok(()) => stats.jobs_revoked += 1,
                Err(e) => warn!(
                    scenario_id = %job.scenario_id,
                    job_id = %job.job_id,
                    error = %e,
                    "Failed to revoke compute job"
                ),
            }
        }

        stats.scenarios_deleted = sqlx::query("DELETE FROM scenarios WHERE net_id = ? AND id IS NOT ?")
            .bind(network.id.to_string())
            .bind(network.default_scenario_id.map(|id| id.to_string()))
            .execute(&mut *conn)
            .await?
            .rows_affected();

        // Milestones and scenario membership go with them
        stats.connections_deleted = sqlx::query(
            r#"
            DELETE FROM connection_requests
            WHERE bus_id IN (SELECT id FROM network_buses WHERE net_id = ?)
            "#,
        )
        .bind(network.id.to_string())
        .execute(&mut *conn)
        .await?
        .rows_affected();

        Ok(stats)
    }
}

/// Code of the network's default scenario, if it still has one
async fn default_scenario_code(
    conn: &mut SqliteConnection,
    network: &Network,
) -> Result<Option<String>> {
    let Some(id) = network.default_scenario_id else {
        return Ok(None);
    };

    let code: Option<String> = sqlx::query_scalar("SELECT code FROM scenarios WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(code)
}

async fn insert_connection_request(
    conn: &mut SqliteConnection,
    resolver: &ReferenceResolver,
    record: &ConnectionRequestDoc,
    bus: &Bus,
    resolution: Resolution,
) -> Result<Uuid> {
    let admin_geo_id = resolver.resolve(conn, ReferenceKey::from(&record.admin_geo)).await?;
    let internal_geo_id = resolver.resolve(conn, ReferenceKey::from(&record.internal_geo)).await?;
    let account_manager_id = resolver.resolve(conn, ReferenceKey::from(&record.account_manager)).await?;
    let grid_analyst_id = resolver.resolve(conn, ReferenceKey::from(&record.grid_analyst)).await?;
    let org_id = resolver.resolve(conn, ReferenceKey::from(&record.organization)).await?;

    let point = record.point();
    let h3_ix = point
        .map(|(lat, lon)| point_to_cell(lat, lon, resolution))
        .transpose()?;
    let extra = record.extra.as_ref().map(serde_json::to_string).transpose()?;

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO connection_requests (
            id, project_id, bus_id, status, connection_kind, connection_energy_kind,
            power_total, power_increase, created_at, date_desired, lat, lon, h3_ix, extra,
            admin_geo_id, internal_geo_id, account_manager_id, grid_analyst_id, org_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&record.id)
    .bind(bus.id.to_string())
    .bind(record.status.as_str())
    .bind(record.connection_kind.as_str())
    .bind(record.connection_energy_kind.as_str())
    .bind(record.power_total)
    .bind(record.power_increase)
    .bind(record.created_date_time)
    .bind(record.date_desired)
    .bind(point.map(|p| p.0))
    .bind(point.map(|p| p.1))
    .bind(h3_ix)
    .bind(extra)
    .bind(admin_geo_id.to_string())
    .bind(internal_geo_id.to_string())
    .bind(account_manager_id.to_string())
    .bind(grid_analyst_id.to_string())
    .bind(org_id.to_string())
    .execute(&mut *conn)
    .await?;

    for (position, milestone) in record.milestone.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO milestones (id, connection_request_id, position, value, reason, datetime)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(id.to_string())
        .bind(position as i64)
        .bind(&milestone.value)
        .bind(&milestone.reason)
        .bind(milestone.date_time)
        .execute(&mut *conn)
        .await?;
    }

    debug!(project_id = %record.id, bus = %bus.number, id = %id, "Inserted connection request");
    Ok(id)
}

async fn insert_scenario(
    conn: &mut SqliteConnection,
    resolver: &ReferenceResolver,
    net_id: Uuid,
    scenario: &ScenarioDoc,
    inserted: &InsertedRequests<'_>,
) -> Result<Uuid> {
    let author_id = match &scenario.author {
        Some(author) => Some(resolver.resolve(conn, ReferenceKey::from(author)).await?),
        None => None,
    };

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO scenarios (id, net_id, code, name, priority, state, author_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(net_id.to_string())
    .bind(&scenario.code)
    .bind(&scenario.name)
    .bind(scenario.priority)
    .bind(scenario.state.map(|s| s.as_str()))
    .bind(author_id.map(|a| a.to_string()))
    .bind(scenario.created_date_time)
    .execute(&mut *conn)
    .await?;

    let mut seen = HashSet::new();
    let mut unresolved = 0usize;
    let mut members = Vec::new();
    for reference in &scenario.connection_requests_list {
        match inserted.get(reference.ref_id.as_str()) {
            Some(ids) => members.extend(ids.iter().copied().filter(|id| seen.insert(*id))),
            None => unresolved += 1,
        }
    }

    for (position, request_id) in members.iter().enumerate() {
        sqlx::query(
            "INSERT INTO scenario_requests (scenario_id, connection_request_id, position) VALUES (?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(request_id.to_string())
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }

    if unresolved > 0 {
        debug!(
            code = %scenario.code,
            unresolved,
            "Scenario references connection requests not in this import"
        );
    }
    debug!(code = %scenario.code, members = members.len(), id = %id, "Inserted scenario");

    Ok(id)
}

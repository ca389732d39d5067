//! Export of a network's connection requests and scenarios
//!
//! Inverse of the import field mapping: every document field the importer
//! reads is written back under the same key, so exporting and re-importing
//! an unchanged network reproduces it.

use crate::schemas::{
    AdminGeoDoc, ConnectionRequestDoc, ConnectionRequestRef, ConnectivityNode, EmployeeDoc,
    ExtraKeys, FlatItem, InternalGeoDoc, MilestoneDoc, OrganizationDoc, ScenarioDoc,
    UnifiedDocument,
};
use chrono::{DateTime, Utc};
use gridmap_common::db::models::{ConnectionEnergyKind, ConnectionKind, ConnectionStatus};
use gridmap_common::db::networks::load_network;
use gridmap_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

pub struct ExportService {
    db: SqlitePool,
}

impl ExportService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Current connection requests and scenarios of a network as one document
    pub async fn export_unified(&self, net_id: Uuid) -> Result<UnifiedDocument> {
        // One transaction so both lists come from the same snapshot
        let mut tx = self.db.begin().await?;

        load_network(&mut tx, net_id).await?;
        let requests = load_connection_requests(&mut tx, net_id).await?;
        let scenarios = load_scenarios(&mut tx, net_id).await?;

        tx.commit().await?;

        debug!(
            net_id = %net_id,
            connection_requests = requests.len(),
            scenarios = scenarios.len(),
            "Exported network"
        );

        Ok(UnifiedDocument::new(requests, scenarios))
    }

    /// Same content as [`Self::export_unified`], one stamped record per item:
    /// connection requests first, then scenarios
    pub async fn export_flat(&self, net_id: Uuid) -> Result<Vec<FlatItem>> {
        let document = self.export_unified(net_id).await?;
        let UnifiedDocument {
            grid_connection_request_list,
            grid_connection_scenario_list,
        } = document;

        Ok(grid_connection_request_list
            .grid_connection_request
            .into_iter()
            .map(FlatItem::connection_request)
            .chain(
                grid_connection_scenario_list
                    .grid_connection_scenario
                    .into_iter()
                    .map(FlatItem::scenario),
            )
            .collect())
    }
}

async fn load_connection_requests(
    conn: &mut SqliteConnection,
    net_id: Uuid,
) -> Result<Vec<ConnectionRequestDoc>> {
    let mut milestones = load_milestones(conn, net_id).await?;

    let rows = sqlx::query(
        r#"
        SELECT
            cr.id, cr.project_id, cr.status, cr.connection_kind, cr.connection_energy_kind,
            cr.power_total, cr.power_increase, cr.created_at, cr.date_desired, cr.extra,
            b.number AS bus_number,
            ag.code AS ag_code, ag.level0_code AS ag_level0_code,
            ag.level0_name AS ag_level0_name, ag.level1_code AS ag_level1_code,
            ag.level2_code AS ag_level2_code, ag.level2_name AS ag_level2_name,
            ig.level1_code AS ig_level1_code,
            am.full_name AS account_manager,
            ga.full_name AS grid_analyst,
            o.name AS organization
        FROM connection_requests cr
        JOIN network_buses b ON b.id = cr.bus_id
        LEFT JOIN admin_geo ag ON ag.id = cr.admin_geo_id
        LEFT JOIN internal_geo ig ON ig.id = cr.internal_geo_id
        LEFT JOIN users am ON am.id = cr.account_manager_id
        LEFT JOIN users ga ON ga.id = cr.grid_analyst_id
        LEFT JOIN organizations o ON o.id = cr.org_id
        WHERE b.net_id = ?
        ORDER BY cr.rowid
        "#,
    )
    .bind(net_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            connection_request_from_row(row, milestones.remove(&id).unwrap_or_default())
        })
        .collect()
}

fn connection_request_from_row(
    row: &SqliteRow,
    milestone: Vec<MilestoneDoc>,
) -> Result<ConnectionRequestDoc> {
    let status: String = row.get("status");
    let connection_kind: String = row.get("connection_kind");
    let connection_energy_kind: String = row.get("connection_energy_kind");
    let extra: Option<String> = row.get("extra");
    let organization: Option<String> = row.get("organization");

    Ok(ConnectionRequestDoc {
        id: row.get("project_id"),
        created_date_time: row.get::<DateTime<Utc>, _>("created_at"),
        date_desired: row.get::<DateTime<Utc>, _>("date_desired"),
        power_total: row.get("power_total"),
        power_increase: row.get("power_increase"),
        status: status.parse::<ConnectionStatus>()?,
        connection_kind: connection_kind.parse::<ConnectionKind>()?,
        connection_energy_kind: connection_energy_kind.parse::<ConnectionEnergyKind>()?,
        admin_geo: AdminGeoDoc {
            code: row.get("ag_code"),
            level0_code: row.get("ag_level0_code"),
            level0_name: row.get("ag_level0_name"),
            level1_code: row.get("ag_level1_code"),
            level2_code: row.get("ag_level2_code"),
            level2_name: row.get("ag_level2_name"),
        },
        connectivity_node: ConnectivityNode {
            id: Some(row.get("bus_number")),
        },
        account_manager: EmployeeDoc {
            full_name: row.get("account_manager"),
        },
        internal_geo: InternalGeoDoc {
            level1_code: row.get("ig_level1_code"),
        },
        grid_analyst: EmployeeDoc {
            full_name: row.get("grid_analyst"),
        },
        organization: OrganizationDoc {
            name: organization.unwrap_or_default(),
        },
        extra: extra
            .as_deref()
            .map(serde_json::from_str::<ExtraKeys>)
            .transpose()?,
        milestone,
    })
}

/// Milestones of every connection request on the network, keyed by request id
async fn load_milestones(
    conn: &mut SqliteConnection,
    net_id: Uuid,
) -> Result<HashMap<String, Vec<MilestoneDoc>>> {
    let rows = sqlx::query(
        r#"
        SELECT m.connection_request_id, m.value, m.reason, m.datetime
        FROM milestones m
        JOIN connection_requests cr ON cr.id = m.connection_request_id
        JOIN network_buses b ON b.id = cr.bus_id
        WHERE b.net_id = ?
        ORDER BY m.connection_request_id, m.position
        "#,
    )
    .bind(net_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut milestones: HashMap<String, Vec<MilestoneDoc>> = HashMap::new();
    for row in &rows {
        milestones
            .entry(row.get("connection_request_id"))
            .or_default()
            .push(MilestoneDoc {
                value: row.get("value"),
                reason: row.get("reason"),
                date_time: row.get::<DateTime<Utc>, _>("datetime"),
            });
    }

    Ok(milestones)
}

async fn load_scenarios(conn: &mut SqliteConnection, net_id: Uuid) -> Result<Vec<ScenarioDoc>> {
    let mut members = load_memberships(conn, net_id).await?;

    let rows = sqlx::query(
        r#"
        SELECT s.id, s.code, s.name, s.priority, s.state, s.created_at,
               s.author_id, u.full_name AS author_name
        FROM scenarios s
        LEFT JOIN users u ON u.id = s.author_id
        WHERE s.net_id = ?
        ORDER BY s.rowid
        "#,
    )
    .bind(net_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            let state: Option<String> = row.get("state");
            let author_id: Option<String> = row.get("author_id");

            Ok(ScenarioDoc {
                connection_requests_list: members.remove(&id).unwrap_or_default(),
                id: Some(id),
                code: row.get("code"),
                name: row.get("name"),
                priority: row.get("priority"),
                created_date_time: row.get::<DateTime<Utc>, _>("created_at"),
                state: state.as_deref().map(str::parse::<ConnectionStatus>).transpose()?,
                author: author_id.map(|_| EmployeeDoc {
                    full_name: row.get("author_name"),
                }),
                net_id: Some(net_id.to_string()),
            })
        })
        .collect()
}

/// Member project ids of every scenario on the network, in membership order
async fn load_memberships(
    conn: &mut SqliteConnection,
    net_id: Uuid,
) -> Result<HashMap<String, Vec<ConnectionRequestRef>>> {
    let rows = sqlx::query(
        r#"
        SELECT sr.scenario_id, cr.project_id
        FROM scenario_requests sr
        JOIN scenarios s ON s.id = sr.scenario_id
        JOIN connection_requests cr ON cr.id = sr.connection_request_id
        WHERE s.net_id = ?
        ORDER BY sr.scenario_id, sr.position
        "#,
    )
    .bind(net_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut members: HashMap<String, Vec<ConnectionRequestRef>> = HashMap::new();
    for row in &rows {
        members
            .entry(row.get("scenario_id"))
            .or_default()
            .push(ConnectionRequestRef {
                ref_id: row.get("project_id"),
            });
    }

    Ok(members)
}

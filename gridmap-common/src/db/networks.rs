//! Network and bus lookups
//!
//! Buses are owned by the topology import; the datadump workflow only reads
//! them. `create_network` and `insert_bus` exist for topology loaders and
//! test fixtures.

use crate::db::models::{parse_guid, Bus, Network};
use crate::{Error, Result};
use chrono::Utc;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// Code given to the scenario created alongside every network
pub const DEFAULT_SCENARIO_CODE: &str = "default";

/// Load a network, failing with `NotFound` when absent
pub async fn load_network(conn: &mut SqliteConnection, net_id: Uuid) -> Result<Network> {
    let row = sqlx::query("SELECT id, title, default_scenario_id FROM networks WHERE id = ?")
        .bind(net_id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("network {}", net_id)))?;

    let id: String = row.get("id");
    let default_scenario_id: Option<String> = row.get("default_scenario_id");

    Ok(Network {
        id: parse_guid(&id)?,
        title: row.get("title"),
        default_scenario_id: default_scenario_id.as_deref().map(parse_guid).transpose()?,
    })
}

/// All buses of a network, ordered by bus number
pub async fn load_buses(conn: &mut SqliteConnection, net_id: Uuid) -> Result<Vec<Bus>> {
    let rows = sqlx::query(
        r#"
        SELECT id, net_id, number, name, lat, lon
        FROM network_buses
        WHERE net_id = ?
        ORDER BY number
        "#,
    )
    .bind(net_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            let net_id: String = row.get("net_id");
            Ok(Bus {
                id: parse_guid(&id)?,
                net_id: parse_guid(&net_id)?,
                number: row.get("number"),
                name: row.get("name"),
                lat: row.get("lat"),
                lon: row.get("lon"),
            })
        })
        .collect()
}

/// Create a network together with its default scenario
pub async fn create_network(conn: &mut SqliteConnection, title: &str) -> Result<Network> {
    let net_id = Uuid::new_v4();
    let scenario_id = Uuid::new_v4();

    sqlx::query("INSERT INTO networks (id, title) VALUES (?, ?)")
        .bind(net_id.to_string())
        .bind(title)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO scenarios (id, net_id, code, name, priority, created_at)
        VALUES (?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(scenario_id.to_string())
    .bind(net_id.to_string())
    .bind(DEFAULT_SCENARIO_CODE)
    .bind(format!("{} (default)", title))
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE networks SET default_scenario_id = ? WHERE id = ?")
        .bind(scenario_id.to_string())
        .bind(net_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(Network {
        id: net_id,
        title: title.to_string(),
        default_scenario_id: Some(scenario_id),
    })
}

/// Insert a bus; `point` is WGS84 (lat, lon)
pub async fn insert_bus(
    conn: &mut SqliteConnection,
    net_id: Uuid,
    number: &str,
    name: &str,
    point: Option<(f64, f64)>,
) -> Result<Bus> {
    let bus = Bus {
        id: Uuid::new_v4(),
        net_id,
        number: number.to_string(),
        name: name.to_string(),
        lat: point.map(|p| p.0),
        lon: point.map(|p| p.1),
    };

    sqlx::query(
        "INSERT INTO network_buses (id, net_id, number, name, lat, lon) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(bus.id.to_string())
    .bind(net_id.to_string())
    .bind(&bus.number)
    .bind(&bus.name)
    .bind(bus.lat)
    .bind(bus.lon)
    .execute(&mut *conn)
    .await?;

    Ok(bus)
}

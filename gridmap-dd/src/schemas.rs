//! Unified connection document
//!
//! Wire shape shared by the spreadsheet importer, `import_unified` and
//! `export_unified`. Field names are camelCase. Every field read on import
//! is written back under the same key on export.

use chrono::{DateTime, Utc};
use gridmap_common::db::models::{ConnectionEnergyKind, ConnectionKind, ConnectionStatus};
use serde::{Deserialize, Deserializer, Serialize};

/// `source` tag of flattened connection request records
pub const SOURCE_CONNECTION_REQUEST: &str = "connectionRequest";
/// `source` tag of flattened scenario records
pub const SOURCE_SCENARIO: &str = "scenario";

/// Top-level document: connection requests plus scenarios grouping them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedDocument {
    pub grid_connection_request_list: ConnectionRequestList,
    pub grid_connection_scenario_list: ScenarioList,
}

impl UnifiedDocument {
    pub fn new(requests: Vec<ConnectionRequestDoc>, scenarios: Vec<ScenarioDoc>) -> Self {
        Self {
            grid_connection_request_list: ConnectionRequestList {
                grid_connection_request: requests,
            },
            grid_connection_scenario_list: ScenarioList {
                grid_connection_scenario: scenarios,
            },
        }
    }

    pub fn requests(&self) -> &[ConnectionRequestDoc] {
        &self.grid_connection_request_list.grid_connection_request
    }

    pub fn scenarios(&self) -> &[ScenarioDoc] {
        &self.grid_connection_scenario_list.grid_connection_scenario
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequestList {
    #[serde(default)]
    pub grid_connection_request: Vec<ConnectionRequestDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioList {
    #[serde(default)]
    pub grid_connection_scenario: Vec<ScenarioDoc>,
}

/// Administrative geography (municipality / county codes)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminGeoDoc {
    #[serde(default = "default_admin_code")]
    pub code: Option<i64>,
    #[serde(default)]
    pub level0_code: Option<String>,
    #[serde(default)]
    pub level0_name: Option<String>,
    #[serde(default)]
    pub level1_code: Option<i64>,
    #[serde(default)]
    pub level2_code: Option<i64>,
    #[serde(default)]
    pub level2_name: Option<String>,
}

fn default_admin_code() -> Option<i64> {
    Some(0)
}

/// Grid operator's internal geography
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalGeoDoc {
    #[serde(default)]
    pub level1_code: Option<String>,
}

/// Person reference (account manager, grid analyst, scenario author)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeDoc {
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationDoc {
    pub name: String,
}

/// Explicit bus reference; accepts a string or an integer id
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityNode {
    #[serde(default, deserialize_with = "deserialize_node_id")]
    pub id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNodeId {
    Text(String),
    Int(i64),
}

/// Blank ids count as absent
fn deserialize_node_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawNodeId>::deserialize(deserializer)? {
        Some(RawNodeId::Text(s)) if s.trim().is_empty() => None,
        Some(RawNodeId::Text(s)) => Some(s),
        Some(RawNodeId::Int(i)) => Some(i.to_string()),
        None => None,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneDoc {
    pub value: String,
    pub reason: String,
    #[serde(default = "Utc::now")]
    pub date_time: DateTime<Utc>,
}

/// Free-form extras; carries the record's WGS84 point
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraKeys {
    #[serde(default)]
    pub capacity_limited_area: Option<String>,
    #[serde(default)]
    pub national_transmission_grid_connection_process: Option<String>,
    #[serde(default)]
    pub sweref99tm_northing: Option<f64>,
    #[serde(default)]
    pub sweref99tm_easting: Option<f64>,
    #[serde(default)]
    pub wsg84lat: Option<f64>,
    #[serde(default)]
    pub wsg84lon: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequestDoc {
    /// External project id (business key)
    pub id: String,
    #[serde(default = "Utc::now")]
    pub created_date_time: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub date_desired: DateTime<Utc>,
    pub power_total: f64,
    pub power_increase: f64,
    pub status: ConnectionStatus,
    pub connection_kind: ConnectionKind,
    pub connection_energy_kind: ConnectionEnergyKind,
    pub admin_geo: AdminGeoDoc,
    #[serde(default)]
    pub connectivity_node: ConnectivityNode,
    #[serde(default)]
    pub account_manager: EmployeeDoc,
    #[serde(default)]
    pub internal_geo: InternalGeoDoc,
    #[serde(default)]
    pub grid_analyst: EmployeeDoc,
    pub organization: OrganizationDoc,
    #[serde(default)]
    pub extra: Option<ExtraKeys>,
    #[serde(default)]
    pub milestone: Vec<MilestoneDoc>,
}

impl ConnectionRequestDoc {
    /// WGS84 (lat, lon) when both coordinates are present
    pub fn point(&self) -> Option<(f64, f64)> {
        let extra = self.extra.as_ref()?;
        match (extra.wsg84lat, extra.wsg84lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn bus_number(&self) -> Option<&str> {
        self.connectivity_node.id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequestRef {
    pub ref_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDoc {
    /// Database id; emitted on export, ignored on import
    #[serde(default)]
    pub id: Option<String>,
    pub code: String,
    pub name: String,
    #[serde(default = "default_priority")]
    pub priority: Option<i64>,
    #[serde(default = "Utc::now")]
    pub created_date_time: DateTime<Utc>,
    #[serde(default)]
    pub state: Option<ConnectionStatus>,
    #[serde(default)]
    pub author: Option<EmployeeDoc>,
    #[serde(default)]
    pub connection_requests_list: Vec<ConnectionRequestRef>,
    /// Owning network; emitted on export, ignored on import
    #[serde(default)]
    pub net_id: Option<String>,
}

fn default_priority() -> Option<i64> {
    Some(0)
}

/// Document record stamped for analytics ingestion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRecord<T> {
    #[serde(flatten)]
    pub record: T,
    pub time: DateTime<Utc>,
    pub source: &'static str,
}

/// One line of the flat export
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlatItem {
    ConnectionRequest(FlatRecord<ConnectionRequestDoc>),
    Scenario(FlatRecord<ScenarioDoc>),
}

impl FlatItem {
    pub fn connection_request(doc: ConnectionRequestDoc) -> Self {
        Self::ConnectionRequest(FlatRecord {
            time: doc.created_date_time,
            source: SOURCE_CONNECTION_REQUEST,
            record: doc,
        })
    }

    pub fn scenario(doc: ScenarioDoc) -> Self {
        Self::Scenario(FlatRecord {
            time: doc.created_date_time,
            source: SOURCE_SCENARIO,
            record: doc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    {
      "gridConnectionRequestList": {
        "gridConnectionRequest": [
          {
            "id": "P-100",
            "createdDateTime": "2023-05-01T08:00:00Z",
            "dateDesired": "2025-01-01T00:00:00Z",
            "powerTotal": 12.5,
            "powerIncrease": 2.5,
            "status": "2_reservation",
            "connectionKind": "expansion",
            "connectionEnergyKind": "consumptionProduction",
            "adminGeo": {"code": 180, "level0Code": "SE", "level0Name": "Sweden", "level1Code": 1},
            "connectivityNode": {"id": 4711},
            "accountManager": {"fullName": "Alex Berg"},
            "internalGeo": {"level1Code": "NORTH"},
            "gridAnalyst": {"fullName": "Kim Lund"},
            "organization": {"name": "Acme Energy"},
            "extra": {"wsg84lat": 59.33, "wsg84lon": 18.06},
            "milestone": [{"value": "applied", "reason": "initial", "dateTime": "2023-05-02T00:00:00Z"}]
          }
        ]
      },
      "gridConnectionScenarioList": {
        "gridConnectionScenario": [
          {
            "code": "S1",
            "name": "Scenario one",
            "state": "1_request",
            "connectionRequestsList": [{"refId": "P-100"}]
          }
        ]
      }
    }
    "#;

    #[test]
    fn test_parse_sample_document() {
        let doc: UnifiedDocument = serde_json::from_str(SAMPLE).unwrap();

        assert_eq!(doc.requests().len(), 1);
        let req = &doc.requests()[0];
        assert_eq!(req.id, "P-100");
        assert_eq!(req.status, ConnectionStatus::Reservation);
        assert_eq!(req.connection_energy_kind, ConnectionEnergyKind::Both);
        assert_eq!(req.bus_number(), Some("4711"));
        assert_eq!(req.point(), Some((59.33, 18.06)));
        assert_eq!(req.admin_geo.level0_code.as_deref(), Some("SE"));
        assert_eq!(req.admin_geo.level2_code, None);
        assert_eq!(req.milestone.len(), 1);

        let scenario = &doc.scenarios()[0];
        assert_eq!(scenario.priority, Some(0));
        assert_eq!(scenario.author, None);
        assert_eq!(scenario.connection_requests_list[0].ref_id, "P-100");
    }

    #[test]
    fn test_blank_connectivity_node_is_absent() {
        let node: ConnectivityNode = serde_json::from_str(r#"{"id": "  "}"#).unwrap();
        assert_eq!(node.id, None);

        let node: ConnectivityNode = serde_json::from_str(r#"{"id": null}"#).unwrap();
        assert_eq!(node.id, None);

        let node: ConnectivityNode = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(node.id, None);
    }

    #[test]
    fn test_point_requires_both_coordinates() {
        let mut doc: UnifiedDocument = serde_json::from_str(SAMPLE).unwrap();
        let req = &mut doc.grid_connection_request_list.grid_connection_request[0];

        req.extra.as_mut().unwrap().wsg84lon = None;
        assert_eq!(req.point(), None);

        req.extra = None;
        assert_eq!(req.point(), None);
    }

    #[test]
    fn test_serialized_keys_match_input_keys() {
        let doc: UnifiedDocument = serde_json::from_str(SAMPLE).unwrap();
        let value = serde_json::to_value(&doc).unwrap();

        let req = &value["gridConnectionRequestList"]["gridConnectionRequest"][0];
        for key in [
            "id",
            "createdDateTime",
            "dateDesired",
            "powerTotal",
            "powerIncrease",
            "status",
            "connectionKind",
            "connectionEnergyKind",
            "adminGeo",
            "connectivityNode",
            "accountManager",
            "internalGeo",
            "gridAnalyst",
            "organization",
            "extra",
            "milestone",
        ] {
            assert!(req.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(req["connectivityNode"]["id"], "4711");
        assert_eq!(req["extra"]["wsg84lat"], 59.33);
    }

    #[test]
    fn test_flat_item_carries_time_and_source() {
        let doc: UnifiedDocument = serde_json::from_str(SAMPLE).unwrap();
        let item = FlatItem::connection_request(doc.requests()[0].clone());
        let value = serde_json::to_value(&item).unwrap();

        assert_eq!(value["source"], SOURCE_CONNECTION_REQUEST);
        assert_eq!(value["time"], value["createdDateTime"]);
        assert_eq!(value["id"], "P-100");
    }
}

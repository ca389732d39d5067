//! Integration tests for the export projection and export/import round trips

mod helpers;

use gridmap_common::Error;
use gridmap_dd::schemas::{FlatItem, SOURCE_CONNECTION_REQUEST, SOURCE_SCENARIO};
use gridmap_dd::{ExportService, ImportService, UnifiedDocument};
use helpers::*;
use std::sync::Arc;
use uuid::Uuid;

fn services(pool: &sqlx::SqlitePool) -> (ImportService, ExportService) {
    (
        ImportService::new(pool.clone(), Arc::new(RecordingQueue::default())),
        ExportService::new(pool.clone()),
    )
}

/// Scenario ids are regenerated by every import
fn without_scenario_ids(mut doc: UnifiedDocument) -> UnifiedDocument {
    for scenario in doc.grid_connection_scenario_list.grid_connection_scenario.iter_mut() {
        if scenario.code != "default" {
            scenario.id = None;
        }
    }
    doc
}

fn sample_document() -> UnifiedDocument {
    let mut by_distance = request("P-2", None, Some((0.0, 0.0099)));
    by_distance.grid_analyst.full_name = Some("Robin Ek".to_string());

    UnifiedDocument::new(
        vec![
            request("P-1", Some("B1"), Some((0.0, 0.0001))),
            by_distance,
            request("P-3", Some("B1"), None),
        ],
        vec![
            scenario("S1", &["P-3", "P-1"]),
            scenario("S2", &["P-2", "P-404"]),
        ],
    )
}

#[tokio::test]
async fn test_missing_network_is_not_found() {
    let (_dir, pool) = create_test_db().await;
    let (_, exporter) = services(&pool);

    let err = exporter.export_unified(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {:?}", err);

    let err = exporter.export_flat(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_fresh_network_exports_default_scenario_only() {
    let (_dir, pool) = create_test_db().await;
    let network = seed_two_bus_network(&pool).await;
    let (_, exporter) = services(&pool);

    let doc = exporter.export_unified(network.id).await.unwrap();

    assert!(doc.requests().is_empty());
    assert_eq!(doc.scenarios().len(), 1);
    assert_eq!(doc.scenarios()[0].code, "default");
    assert_eq!(
        doc.scenarios()[0].id,
        network.default_scenario_id.map(|id| id.to_string())
    );
}

#[tokio::test]
async fn test_export_mirrors_imported_fields() {
    let (_dir, pool) = create_test_db().await;
    let network = seed_two_bus_network(&pool).await;
    let (importer, exporter) = services(&pool);
    let input = sample_document();

    importer.import_unified(network.id, &input, Some(50.0)).await.unwrap();
    let doc = exporter.export_unified(network.id).await.unwrap();

    let ids: Vec<&str> = doc.requests().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["P-1", "P-2", "P-3"]);

    // Matched bus is written back as the explicit connectivity node
    let p2 = &doc.requests()[1];
    assert_eq!(p2.connectivity_node.id.as_deref(), Some("B2"));

    // Everything else comes back as it went in
    for (exported, original) in doc.requests().iter().zip(input.requests()) {
        let mut expected = original.clone();
        expected.connectivity_node = exported.connectivity_node.clone();
        assert_eq!(exported, &expected);
    }

    let codes: Vec<&str> = doc.scenarios().iter().map(|s| s.code.as_str()).collect();
    assert_eq!(codes, vec!["default", "S1", "S2"]);

    let s1 = &doc.scenarios()[1];
    let members: Vec<&str> = s1
        .connection_requests_list
        .iter()
        .map(|r| r.ref_id.as_str())
        .collect();
    assert_eq!(members, vec!["P-3", "P-1"]);
    assert_eq!(s1.net_id, Some(network.id.to_string()));
    assert!(s1.id.is_some());
    assert_eq!(s1.author, input.scenarios()[0].author);
    assert_eq!(s1.state, input.scenarios()[0].state);
    assert_eq!(s1.created_date_time, input.scenarios()[0].created_date_time);

    // The unknown reference is dropped
    let s2 = &doc.scenarios()[2];
    assert_eq!(s2.connection_requests_list.len(), 1);
    assert_eq!(s2.connection_requests_list[0].ref_id, "P-2");
}

#[tokio::test]
async fn test_export_import_round_trip_is_stable() {
    let (_dir, pool) = create_test_db().await;
    let network = seed_two_bus_network(&pool).await;
    let (importer, exporter) = services(&pool);

    importer
        .import_unified(network.id, &sample_document(), Some(50.0))
        .await
        .unwrap();
    let first = exporter.export_unified(network.id).await.unwrap();

    let stats_a = importer.import_unified(network.id, &first, None).await.unwrap();
    let second = exporter.export_unified(network.id).await.unwrap();

    let stats_b = importer.import_unified(network.id, &second, None).await.unwrap();
    let third = exporter.export_unified(network.id).await.unwrap();

    assert_eq!(stats_a, stats_b);
    assert_eq!(stats_a.inserted_connections, 3);
    assert_eq!(stats_a.skipped_connections, 0);
    assert_eq!(stats_a.inserted_scenarios, 2);

    assert_eq!(without_scenario_ids(first.clone()), without_scenario_ids(second.clone()));
    assert_eq!(without_scenario_ids(second), without_scenario_ids(third));
}

#[tokio::test]
async fn test_round_trip_through_json() {
    let (_dir, pool) = create_test_db().await;
    let network = seed_two_bus_network(&pool).await;
    let (importer, exporter) = services(&pool);

    importer
        .import_unified(network.id, &sample_document(), Some(50.0))
        .await
        .unwrap();
    let first = exporter.export_unified(network.id).await.unwrap();

    let json = serde_json::to_string(&first).unwrap();
    let parsed: UnifiedDocument = serde_json::from_str(&json).unwrap();
    importer.import_unified(network.id, &parsed, None).await.unwrap();

    let second = exporter.export_unified(network.id).await.unwrap();
    assert_eq!(without_scenario_ids(first), without_scenario_ids(second));
}

#[tokio::test]
async fn test_flat_export_stamps_time_and_source() {
    let (_dir, pool) = create_test_db().await;
    let network = seed_two_bus_network(&pool).await;
    let (importer, exporter) = services(&pool);

    importer
        .import_unified(network.id, &sample_document(), Some(50.0))
        .await
        .unwrap();
    let items = exporter.export_flat(network.id).await.unwrap();

    // 3 connection requests, then default + 2 scenarios
    assert_eq!(items.len(), 6);
    assert!(matches!(items[0], FlatItem::ConnectionRequest(_)));
    assert!(matches!(items[5], FlatItem::Scenario(_)));

    let json = serde_json::to_value(&items).unwrap();
    assert_eq!(json[0]["source"], SOURCE_CONNECTION_REQUEST);
    assert_eq!(json[0]["id"], "P-1");
    assert_eq!(json[0]["time"], json[0]["createdDateTime"]);
    assert_eq!(json[4]["source"], SOURCE_SCENARIO);
    assert_eq!(json[4]["code"], "S1");
    assert_eq!(json[4]["time"], json[4]["createdDateTime"]);
}

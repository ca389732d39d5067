//! Adaptive hexagonal cell resolution
//!
//! Picks the coarsest H3 resolution whose average cell is small enough to
//! split a network's footprint into roughly [`TARGET_CLUSTER_COUNT`] cells,
//! and tags points with the cell they fall in.

use geo::{ConvexHull, GeodesicArea, MultiPoint, Point};
use gridmap_common::db::models::Bus;
use gridmap_common::{Error, Result};
use h3o::{LatLng, Resolution};

/// Number of clusters a network footprint should roughly split into
pub const TARGET_CLUSTER_COUNT: f64 = 400.0;

/// Grid levels ordered coarse to fine
fn levels() -> impl Iterator<Item = Resolution> {
    (0..=15u8).filter_map(|level| Resolution::try_from(level).ok())
}

/// Average cell area (m²) at `resolution`
pub fn resolution_cell_area(resolution: Resolution) -> f64 {
    resolution.area_m2()
}

/// H3 cell id (hex string) containing the WGS84 point
pub fn point_to_cell(lat: f64, lon: f64, resolution: Resolution) -> Result<String> {
    let latlng = LatLng::new(lat, lon)
        .map_err(|e| Error::InvalidInput(format!("Invalid coordinate ({}, {}): {}", lat, lon, e)))?;
    Ok(latlng.to_cell(resolution).to_string())
}

/// Geodesic area (m²) of the convex envelope of `points` given as (lat, lon).
///
/// `None` when there are no points. One or two points, or collinear points,
/// give a degenerate envelope of zero area.
pub fn envelope_area_m2(points: &[(f64, f64)]) -> Option<f64> {
    if points.is_empty() {
        return None;
    }

    let multi_point: MultiPoint<f64> = points
        .iter()
        .map(|&(lat, lon)| Point::new(lon, lat))
        .collect();

    Some(multi_point.convex_hull().geodesic_area_unsigned())
}

/// Coarsest level whose cell area is at most `area_m2 / TARGET_CLUSTER_COUNT`.
///
/// Falls back to the finest level when none qualifies.
pub fn select_resolution(area_m2: f64) -> Resolution {
    let desired_cell_area = area_m2 / TARGET_CLUSTER_COUNT;

    levels()
        .find(|res| resolution_cell_area(*res) <= desired_cell_area)
        .unwrap_or(Resolution::Fifteen)
}

/// Resolution for a network's buses; fails when no bus is geocoded
pub fn resolution_for_buses(buses: &[Bus]) -> Result<Resolution> {
    let points: Vec<(f64, f64)> = buses.iter().filter_map(Bus::point).collect();

    let area = envelope_area_m2(&points).ok_or_else(|| {
        Error::SpatialResolution(format!(
            "none of {} buses has a geographic point",
            buses.len()
        ))
    })?;

    let resolution = select_resolution(area);
    tracing::debug!(
        geocoded_buses = points.len(),
        area_km2 = area / 1_000_000.0,
        resolution = u8::from(resolution),
        "Selected spatial cell resolution"
    );

    Ok(resolution)
}

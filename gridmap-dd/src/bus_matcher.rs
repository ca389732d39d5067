//! Connection request to bus matching
//!
//! Resolution order:
//! 1. Explicit connectivity-node id: the bus with that `number`, or no match
//!    at all (distance is never consulted)
//! 2. Without an id, the nearest geocoded bus by haversine distance, accepted when the distance
//!    is at most the threshold (inclusive)
//!
//! Buses are scanned in slice order; on equal distances the first one wins.
//! Callers load buses ordered by `number`.

use crate::schemas::ConnectionRequestDoc;
use geo::{HaversineDistance, Point};
use gridmap_common::db::models::Bus;
use thiserror::Error;

/// A successful match
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BusMatch<'a> {
    ByNumber(&'a Bus),
    Nearest { bus: &'a Bus, distance_m: f64 },
}

impl<'a> BusMatch<'a> {
    pub fn bus(&self) -> &'a Bus {
        match self {
            Self::ByNumber(bus) => bus,
            Self::Nearest { bus, .. } => bus,
        }
    }
}

/// Why a record could not be matched; the record is skipped, not failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NoMatch {
    #[error("no connectivity node id and no distance threshold")]
    NoIdentifier,
    /// Bus id not in the network
    #[error("bus number {0:?} not found in network")]
    UnknownNumber(String),
    #[error("record has no coordinates")]
    NoGeometry,
    #[error("network has no geocoded bus")]
    NoGeocodedBus,
    #[error("closest bus {nearest} is at {distance_m:.1}m, max allowed is {max_distance_m}m")]
    DistanceExceeded {
        nearest: String,
        distance_m: f64,
        max_distance_m: f64,
    },
}

/// Great-circle distance in meters between two (lat, lon) points
pub fn distance_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    Point::new(a.1, a.0).haversine_distance(&Point::new(b.1, b.0))
}

/// Nearest geocoded bus to `point`; first one wins on ties
pub fn nearest_bus(point: (f64, f64), buses: &[Bus]) -> Option<(&Bus, f64)> {
    let mut best: Option<(&Bus, f64)> = None;

    for bus in buses {
        let Some(bus_point) = bus.point() else {
            continue;
        };
        let d = distance_m(point, bus_point);
        if best.map_or(true, |(_, best_d)| d < best_d) {
            best = Some((bus, d));
        }
    }

    best
}

/// Match a record to a bus.
///
/// `max_distance_m` of `None` or zero disables distance matching.
pub fn match_bus<'a>(
    record: &ConnectionRequestDoc,
    buses: &'a [Bus],
    max_distance_m: Option<f64>,
) -> Result<BusMatch<'a>, NoMatch> {
    if let Some(number) = record.bus_number() {
        return buses
            .iter()
            .find(|b| b.number == number)
            .map(BusMatch::ByNumber)
            .ok_or_else(|| NoMatch::UnknownNumber(number.to_string()));
    }

    match_by_distance(record, buses, max_distance_m)
}

fn match_by_distance<'a>(
    record: &ConnectionRequestDoc,
    buses: &'a [Bus],
    max_distance_m: Option<f64>,
) -> Result<BusMatch<'a>, NoMatch> {
    let max_distance_m = match max_distance_m {
        Some(d) if d > 0.0 => d,
        _ => return Err(NoMatch::NoIdentifier),
    };

    let point = record.point().ok_or(NoMatch::NoGeometry)?;
    let (bus, distance_m) = nearest_bus(point, buses).ok_or(NoMatch::NoGeocodedBus)?;

    if distance_m <= max_distance_m {
        Ok(BusMatch::Nearest { bus, distance_m })
    } else {
        Err(NoMatch::DistanceExceeded {
            nearest: bus.number.clone(),
            distance_m,
            max_distance_m,
        })
    }
}

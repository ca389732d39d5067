//! # Gridmap Datadump (gridmap-dd)
//!
//! Bulk import and export of a network's connection requests and scenarios.
//!
//! **Import** replaces everything a previous import created for the network
//! in one transaction: pending compute jobs are revoked, records are matched
//! to buses by number or by distance, reference rows (people, organizations,
//! geographies) are deduplicated, and points are tagged with a hexagonal
//! cell at a resolution sized to the network.
//!
//! **Export** rebuilds the same document shape from the database, plus a
//! flat variant for analytics ingestion.

pub mod bus_matcher;
pub mod jobs;
pub mod references;
pub mod schemas;
pub mod services;
pub mod single_flight;
pub mod spatial;

pub use jobs::{DisabledJobQueue, FlowerJobQueue, JobQueue};
pub use schemas::UnifiedDocument;
pub use services::{ExportService, ImportService, ImportStats};

//! Import and export workflows

pub mod export;
pub mod import;

pub use export::ExportService;
pub use import::{ImportService, ImportStats};

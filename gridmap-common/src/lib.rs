//! # Gridmap Common Library
//!
//! Shared code for the gridmap services:
//! - Error taxonomy
//! - Configuration loading
//! - Database bootstrap, row models and network lookups

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};

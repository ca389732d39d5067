//! Configuration loading
//!
//! Every setting resolves in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is never fatal; defaults apply.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the database file location
pub const DATABASE_ENV: &str = "GRIDMAP_DATABASE";
/// Environment variable overriding the nearest-bus distance threshold (meters)
pub const MAX_BUS_DISTANCE_ENV: &str = "GRIDMAP_MAX_BUS_DISTANCE";
/// Environment variable overriding the compute job queue base URL
pub const JOB_QUEUE_URL_ENV: &str = "GRIDMAP_JOB_QUEUE_URL";

const DEFAULT_LOG_LEVEL: &str = "info";

/// Contents of `config.toml`; every key is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    pub database_path: Option<PathBuf>,
    pub max_bus_distance_m: Option<f64>,
    pub job_queue_url: Option<String>,
    pub log_level: Option<String>,
}

impl TomlConfig {
    /// Parse a specific config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))
    }

    /// Load configuration.
    ///
    /// An explicitly named file must exist and parse. Without one, the
    /// platform search path is tried and any problem degrades to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        for candidate in config_file_candidates() {
            if !candidate.exists() {
                continue;
            }
            return match Self::from_file(&candidate) {
                Ok(config) => {
                    debug!(path = %candidate.display(), "Loaded config file");
                    Ok(config)
                }
                Err(e) => {
                    warn!("{} - using defaults", e);
                    Ok(Self::default())
                }
            };
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub database_path: Option<PathBuf>,
    pub max_bus_distance_m: Option<f64>,
    pub job_queue_url: Option<String>,
}

/// Fully resolved settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_path: PathBuf,
    /// Nearest-bus matching threshold; `None` disables distance matching
    pub max_bus_distance_m: Option<f64>,
    /// Base URL of the job queue monitor; `None` disables cancellation
    pub job_queue_url: Option<String>,
    pub log_level: String,
}

impl Settings {
    /// Merge command line, environment, config file and defaults
    pub fn resolve(cli: &CliOverrides, file: &TomlConfig) -> Result<Self> {
        let database_path = cli
            .database_path
            .clone()
            .or_else(|| std::env::var(DATABASE_ENV).ok().map(PathBuf::from))
            .or_else(|| file.database_path.clone())
            .unwrap_or_else(default_database_path);

        let max_bus_distance_m = match cli.max_bus_distance_m {
            Some(d) => Some(d),
            None => match std::env::var(MAX_BUS_DISTANCE_ENV) {
                Ok(raw) => Some(raw.trim().parse::<f64>().map_err(|_| {
                    Error::Config(format!("{} is not a number: {:?}", MAX_BUS_DISTANCE_ENV, raw))
                })?),
                Err(_) => file.max_bus_distance_m,
            },
        };

        if let Some(d) = max_bus_distance_m {
            if !d.is_finite() || d < 0.0 {
                return Err(Error::Config(format!(
                    "max bus distance must be a non-negative number of meters, got {}",
                    d
                )));
            }
        }

        let job_queue_url = cli
            .job_queue_url
            .clone()
            .or_else(|| std::env::var(JOB_QUEUE_URL_ENV).ok())
            .or_else(|| file.job_queue_url.clone())
            .filter(|url| !url.trim().is_empty());

        let log_level = file
            .log_level
            .clone()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            database_path,
            max_bus_distance_m,
            job_queue_url,
            log_level,
        })
    }
}

/// Config file search path, most specific first
pub fn config_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("gridmap").join("config.toml"));
    }
    if cfg!(unix) {
        candidates.push(PathBuf::from("/etc/gridmap/config.toml"));
    }
    candidates
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("gridmap"))
        .unwrap_or_else(|| PathBuf::from("./gridmap_data"))
        .join("gridmap.db")
}

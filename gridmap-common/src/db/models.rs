//! Database models
//!
//! Identifiers are stored as TEXT (hyphenated UUID). Enumerations are stored
//! as the same string codes the unified document uses.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Parse a TEXT identifier column
pub fn parse_guid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("Malformed id {:?}: {}", s, e)))
}

/// Defines a string-coded enum with `as_str`, `Display` and `FromStr`
macro_rules! string_coded {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $code:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $code)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $code),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($code => Ok(Self::$variant),)+
                    other => Err(Error::InvalidInput(format!(
                        "Unknown {} code: {:?}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

string_coded! {
    /// Connection request lifecycle status
    pub enum ConnectionStatus {
        Request => "1_request",
        Reservation => "2_reservation",
        Planning => "4_planning",
        Connection => "5_connection",
        Network => "6_network",
    }
}

string_coded! {
    /// Kind of capacity change requested
    pub enum ConnectionKind {
        New => "new",
        Expansion => "expansion",
        Move => "move",
        Other => "other",
    }
}

string_coded! {
    /// Direction of energy flow at the connection
    pub enum ConnectionEnergyKind {
        Consumption => "consumption",
        Production => "production",
        Both => "consumptionProduction",
        Other => "other",
    }
}

string_coded! {
    /// Compute job state as reported by the task queue
    pub enum JobStatus {
        Pending => "PENDING",
        Received => "RECEIVED",
        Started => "STARTED",
        Progress => "PROGRESS",
        Retry => "RETRY",
        Success => "SUCCESS",
        Failure => "FAILURE",
        Revoked => "REVOKED",
    }
}

impl JobStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Revoked)
    }

    /// Codes of all terminal states, for SQL filters
    pub fn terminal_codes() -> [&'static str; 3] {
        [
            Self::Success.as_str(),
            Self::Failure.as_str(),
            Self::Revoked.as_str(),
        ]
    }
}

/// Grid network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub id: Uuid,
    pub title: String,
    /// Scenario exempt from replace/purge
    pub default_scenario_id: Option<Uuid>,
}

/// Grid connectivity node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: Uuid,
    pub net_id: Uuid,
    /// Business key, unique within a network
    pub number: String,
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl Bus {
    /// WGS84 (lat, lon) when the bus is geocoded
    pub fn point(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

//! Database bootstrap, models and network lookups

pub mod init;
pub mod models;
pub mod networks;

pub use init::*;
pub use models::*;
pub use networks::*;

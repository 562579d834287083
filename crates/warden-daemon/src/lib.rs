//! Warden daemon library
//!
//! - [`DaemonConfig`]: layered configuration (defaults, file, environment)
//! - [`Daemon`]: opens storage, builds the moderation service and runs
//!   startup reconciliation

pub mod config;
pub mod daemon;
pub mod error;

pub use config::{DaemonConfig, LoggingConfig, StorageConfig};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};

//! Configuration for warden-daemon

use serde::{Deserialize, Serialize};
use warden_policy::PolicyConfig;
use warden_restriction::RestrictionConfig;

use crate::{DaemonError, DaemonResult};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Restriction manager configuration
    #[serde(default)]
    pub restriction: RestrictionConfig,

    /// Escalation thresholds
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage; restrictions do not survive a restart
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `WARDEN__`-prefixed environment variables.
    pub fn load(path: Option<&str>) -> DaemonResult<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // WARDEN__RESTRICTION__MARKER_ROLE_ID=123 sets restriction.marker_role_id
        builder = builder.add_source(
            config::Environment::with_prefix("WARDEN")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn validate(&self) -> DaemonResult<()> {
        self.restriction
            .validate()
            .map_err(|e| DaemonError::Config(e.to_string()))?;
        self.policy
            .validate()
            .map_err(|e| DaemonError::Config(e.to_string()))?;
        if let StorageConfig::Postgres { url, .. } = &self.storage {
            if url.is_empty() {
                return Err(DaemonError::Config("storage.url must not be empty".to_string()));
            }
        }
        Ok(())
    }
}

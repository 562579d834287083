//! Escalation thresholds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Policy configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("invalid threshold `{field}`: {reason}")]
    InvalidThreshold { field: &'static str, reason: String },
}

/// Thresholds for each escalation tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Every Nth active warning triggers a restriction.
    pub warning_threshold: u32,

    /// Length of the warning-triggered restriction.
    #[serde(rename = "warning_restriction_secs", with = "duration_secs")]
    pub warning_restriction: Duration,

    /// Every Nth counted restriction triggers a removal.
    pub restriction_threshold: u32,

    /// Every Nth removal triggers a ban.
    pub removal_threshold: u32,

    /// Whether a warning-triggered restriction feeds the restriction tier.
    pub threshold_restriction_counts: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 3,
            warning_restriction: DAY,
            restriction_threshold: 3,
            removal_threshold: 2,
            threshold_restriction_counts: true,
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<(), PolicyError> {
        for (field, value) in [
            ("warning_threshold", self.warning_threshold),
            ("restriction_threshold", self.restriction_threshold),
            ("removal_threshold", self.removal_threshold),
        ] {
            if value == 0 {
                return Err(PolicyError::InvalidThreshold {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.warning_restriction.as_secs() < 60 {
            return Err(PolicyError::InvalidThreshold {
                field: "warning_restriction",
                reason: "must be at least one minute".to_string(),
            });
        }

        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

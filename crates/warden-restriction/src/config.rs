//! Manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_types::RoleId;

use crate::{RestrictionError, RestrictionResult};

/// Configuration for the [`crate::TimedRestrictionManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestrictionConfig {
    /// Role granted while a member is restricted.
    #[serde(rename = "marker_role_id")]
    pub marker_role: RoleId,

    /// Extra wait added to every reversal timer.
    #[serde(rename = "timer_slack_ms", with = "duration_millis")]
    pub timer_slack: Duration,
}

impl Default for RestrictionConfig {
    fn default() -> Self {
        Self {
            marker_role: RoleId::new(0),
            timer_slack: Duration::from_millis(500),
        }
    }
}

impl RestrictionConfig {
    pub fn new(marker_role: RoleId) -> Self {
        Self {
            marker_role,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> RestrictionResult<()> {
        if self.marker_role.get() == 0 {
            return Err(RestrictionError::InvalidConfig(
                "marker_role_id must be set".to_string(),
            ));
        }
        if self.timer_slack > Duration::from_secs(60) {
            return Err(RestrictionError::InvalidConfig(
                "timer_slack_ms must not exceed one minute".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

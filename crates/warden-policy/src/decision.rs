//! Tier evaluation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_types::SanctionCounts;

use crate::{PolicyConfig, PolicyError};

/// A rung of the escalation ladder, named by the count it watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTier {
    Warning,
    Restriction,
    Removal,
}

impl EscalationTier {
    /// The tier to the right of this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Warning => Some(Self::Restriction),
            Self::Restriction => Some(Self::Removal),
            Self::Removal => None,
        }
    }
}

/// What the policy wants done next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SanctionDirective {
    Restrict {
        duration: Duration,
        reason: String,
        /// Whether the restriction feeds the restriction tier.
        counted: bool,
    },
    Remove {
        reason: String,
    },
    Ban {
        reason: String,
    },
}

impl SanctionDirective {
    pub fn reason(&self) -> &str {
        match self {
            Self::Restrict { reason, .. } | Self::Remove { reason } | Self::Ban { reason } => reason,
        }
    }

    /// The tier whose count this directive moves, once applied.
    ///
    /// An uncounted restriction moves nothing, so the chain ends there.
    pub fn next_tier(&self) -> Option<EscalationTier> {
        match self {
            Self::Restrict { counted: true, .. } => Some(EscalationTier::Restriction),
            Self::Restrict { counted: false, .. } => None,
            Self::Remove { .. } => Some(EscalationTier::Removal),
            Self::Ban { .. } => None,
        }
    }
}

/// Pure decision function over a [`PolicyConfig`].
#[derive(Debug, Clone, Default)]
pub struct EscalationPolicy {
    config: PolicyConfig,
}

impl EscalationPolicy {
    pub fn new(config: PolicyConfig) -> Result<Self, PolicyError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Directive for `tier` given the current counts, if its threshold is hit.
    pub fn next_action(
        &self,
        tier: EscalationTier,
        counts: &SanctionCounts,
    ) -> Option<SanctionDirective> {
        let config = &self.config;
        match tier {
            EscalationTier::Warning if crossed(counts.warnings, config.warning_threshold) => {
                Some(SanctionDirective::Restrict {
                    duration: config.warning_restriction,
                    reason: format!("경고 {}회 누적", config.warning_threshold),
                    counted: config.threshold_restriction_counts,
                })
            }
            EscalationTier::Restriction
                if crossed(counts.restrictions, config.restriction_threshold) =>
            {
                Some(SanctionDirective::Remove {
                    reason: format!("재갈 {}회 누적", config.restriction_threshold),
                })
            }
            EscalationTier::Removal if crossed(counts.removals, config.removal_threshold) => {
                Some(SanctionDirective::Ban {
                    reason: format!("추방 {}회 누적", config.removal_threshold),
                })
            }
            _ => None,
        }
    }
}

fn crossed(count: u32, threshold: u32) -> bool {
    threshold > 0 && count > 0 && count % threshold == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn counts(warnings: u32, restrictions: u32, removals: u32) -> SanctionCounts {
        SanctionCounts {
            warnings,
            restrictions,
            removals,
            bans: 0,
        }
    }

    #[test]
    fn test_third_warning_restricts_for_a_day() {
        let policy = EscalationPolicy::default();
        let directive = policy
            .next_action(EscalationTier::Warning, &counts(3, 0, 0))
            .unwrap();
        assert_eq!(
            directive,
            SanctionDirective::Restrict {
                duration: Duration::from_secs(86_400),
                reason: "경고 3회 누적".to_string(),
                counted: true,
            }
        );
        assert_eq!(directive.next_tier(), Some(EscalationTier::Restriction));
    }

    #[test]
    fn test_thresholds_fire_on_every_multiple() {
        let policy = EscalationPolicy::default();
        assert!(policy
            .next_action(EscalationTier::Warning, &counts(6, 0, 0))
            .is_some());
        assert!(policy
            .next_action(EscalationTier::Warning, &counts(4, 0, 0))
            .is_none());
        assert!(policy
            .next_action(EscalationTier::Warning, &counts(0, 0, 0))
            .is_none());
    }

    #[test]
    fn test_restriction_and_removal_tiers() {
        let policy = EscalationPolicy::default();
        assert_eq!(
            policy.next_action(EscalationTier::Restriction, &counts(0, 3, 0)),
            Some(SanctionDirective::Remove {
                reason: "재갈 3회 누적".to_string()
            })
        );
        assert_eq!(
            policy.next_action(EscalationTier::Removal, &counts(0, 0, 2)),
            Some(SanctionDirective::Ban {
                reason: "추방 2회 누적".to_string()
            })
        );
        assert!(policy
            .next_action(EscalationTier::Removal, &counts(0, 0, 1))
            .is_none());
    }

    #[test]
    fn test_tier_only_reads_its_own_count() {
        let policy = EscalationPolicy::default();
        assert!(policy
            .next_action(EscalationTier::Restriction, &counts(3, 1, 2))
            .is_none());
    }

    #[test]
    fn test_uncounted_threshold_restriction_ends_chain() {
        let policy = EscalationPolicy::new(PolicyConfig {
            threshold_restriction_counts: false,
            ..Default::default()
        })
        .unwrap();
        let directive = policy
            .next_action(EscalationTier::Warning, &counts(3, 2, 0))
            .unwrap();
        assert!(matches!(
            directive,
            SanctionDirective::Restrict { counted: false, .. }
        ));
        assert_eq!(directive.next_tier(), None);
    }

    #[test]
    fn test_tier_chain_is_left_to_right() {
        assert_eq!(
            EscalationTier::Warning.next(),
            Some(EscalationTier::Restriction)
        );
        assert_eq!(
            EscalationTier::Restriction.next(),
            Some(EscalationTier::Removal)
        );
        assert_eq!(EscalationTier::Removal.next(), None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = EscalationPolicy::new(PolicyConfig {
            warning_threshold: 0,
            ..Default::default()
        });
        assert!(result.is_err());
    }

    proptest! {
        #[test]
        fn property_warning_tier_fires_iff_positive_multiple(
            warnings in 0u32..500,
            threshold in 1u32..10,
        ) {
            let policy = EscalationPolicy::new(PolicyConfig {
                warning_threshold: threshold,
                ..Default::default()
            })
            .unwrap();
            let fired = policy
                .next_action(EscalationTier::Warning, &counts(warnings, 0, 0))
                .is_some();
            prop_assert_eq!(fired, warnings > 0 && warnings % threshold == 0);
        }
    }
}

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use warden_policy::PolicyConfig;
use warden_restriction::{InMemoryPlatform, RestrictionConfig};
use warden_service::{ModerationService, SanctionContext};
use warden_storage::InMemoryModerationStorage;
use warden_types::{Identity, ManualClock, MemberId, RoleId, ScopeId};

pub const SCOPE: ScopeId = ScopeId(500);
pub const MARKER: RoleId = RoleId(900);
pub const ROLE_A: RoleId = RoleId(11);
pub const ROLE_B: RoleId = RoleId(12);
pub const TARGET: MemberId = MemberId(1);

pub struct Harness {
    pub service: ModerationService,
    pub storage: Arc<InMemoryModerationStorage>,
    pub platform: Arc<InMemoryPlatform>,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(PolicyConfig::default())
    }

    pub fn with_policy(policy: PolicyConfig) -> Self {
        let storage = Arc::new(InMemoryModerationStorage::new());
        let platform = Arc::new(InMemoryPlatform::new());
        platform.create_role(SCOPE, MARKER);
        platform.join(TARGET, SCOPE, [ROLE_A, ROLE_B]);
        let clock = ManualClock::new(Utc::now());
        Self::over(storage, platform, clock, policy)
    }

    /// A second process over the same durable state.
    pub fn restart(&self) -> Self {
        Self::over(
            self.storage.clone(),
            self.platform.clone(),
            self.clock.clone(),
            self.service.policy().config().clone(),
        )
    }

    fn over(
        storage: Arc<InMemoryModerationStorage>,
        platform: Arc<InMemoryPlatform>,
        clock: ManualClock,
        policy: PolicyConfig,
    ) -> Self {
        let service = ModerationService::new(
            storage.clone(),
            platform.clone(),
            policy,
            RestrictionConfig::new(MARKER),
            Arc::new(clock.clone()),
        )
        .unwrap();

        Self {
            service,
            storage,
            platform,
            clock,
        }
    }

    pub fn ctx(&self) -> SanctionContext {
        SanctionContext::new(
            SCOPE,
            Identity::new(TARGET, "target"),
            Identity::new(MemberId::new(7), "moderator"),
        )
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(chrono::Duration::minutes(minutes));
    }

    /// Move the injected clock and tokio's paused clock together, then let
    /// woken timers run.
    pub async fn elapse(&self, by: Duration) {
        self.clock.advance(chrono::Duration::from_std(by).unwrap());
        tokio::time::advance(by).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }
}

//! Daemon lifecycle: storage, service construction, reconciliation.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use warden_restriction::{InMemoryPlatform, PlatformPermissions, ReconcileReport, RestrictionEvent};
use warden_service::ModerationService;
use warden_storage::InMemoryModerationStorage;
use warden_types::{Clock, SystemClock};

use crate::{DaemonConfig, DaemonResult, StorageConfig};

/// A running moderation engine.
pub struct Daemon {
    service: Arc<ModerationService>,
    report: ReconcileReport,
    event_logger: JoinHandle<()>,
}

impl Daemon {
    /// Open storage, build the service over `platform` and reconcile
    /// persisted restrictions.
    pub async fn start(
        config: &DaemonConfig,
        platform: Arc<dyn PlatformPermissions>,
    ) -> DaemonResult<Self> {
        Self::start_with_clock(config, platform, Arc::new(SystemClock)).await
    }

    /// Start with the dry-run platform: role changes are journaled in memory only.
    pub async fn start_dry_run(config: &DaemonConfig) -> DaemonResult<Self> {
        Self::start(config, Arc::new(InMemoryPlatform::new())).await
    }

    pub async fn start_with_clock(
        config: &DaemonConfig,
        platform: Arc<dyn PlatformPermissions>,
        clock: Arc<dyn Clock>,
    ) -> DaemonResult<Self> {
        config.validate()?;

        let service = Arc::new(open_service(config, platform, clock).await?);
        let event_logger = spawn_event_logger(&service);

        let report = service.reconcile_on_startup().await?;
        log_report(&report);

        Ok(Self {
            service,
            report,
            event_logger,
        })
    }

    pub fn service(&self) -> &Arc<ModerationService> {
        &self.service
    }

    /// Reconciliation report produced during startup.
    pub fn startup_report(&self) -> &ReconcileReport {
        &self.report
    }

    /// Wait for `shutdown`, then stop. Pending timers are dropped, not
    /// drained; their records are reconciled on the next start.
    pub async fn run_until<F>(self, shutdown: F) -> DaemonResult<()>
    where
        F: Future<Output = ()>,
    {
        shutdown.await;

        let pending = self.service.restrictions().armed_timers().len();
        info!(pending_timers = pending, "Shutting down");

        self.service.restrictions().abort_timers();
        self.event_logger.abort();
        Ok(())
    }
}

async fn open_service(
    config: &DaemonConfig,
    platform: Arc<dyn PlatformPermissions>,
    clock: Arc<dyn Clock>,
) -> DaemonResult<ModerationService> {
    match &config.storage {
        StorageConfig::Memory => {
            warn!("Using in-memory storage; restrictions will not survive a restart");
            let storage = Arc::new(InMemoryModerationStorage::new());
            Ok(ModerationService::new(
                storage,
                platform,
                config.policy.clone(),
                config.restriction.clone(),
                clock,
            )?)
        }
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            info!(max_connections, "Connecting to PostgreSQL");
            let storage = warden_storage::postgres::PostgresModerationStorage::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await?;
            Ok(ModerationService::new(
                Arc::new(storage),
                platform,
                config.policy.clone(),
                config.restriction.clone(),
                clock,
            )?)
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => Err(crate::DaemonError::Config(
            "postgres storage requires the `postgres` feature".to_string(),
        )),
    }
}

fn spawn_event_logger(service: &ModerationService) -> JoinHandle<()> {
    let mut rx = service.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Restriction event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &RestrictionEvent) {
    match event {
        RestrictionEvent::Applied { key, expires_at } => {
            info!(key = %key, expires_at = %expires_at, "Restriction applied");
        }
        RestrictionEvent::Reversed { key, origin } => {
            info!(key = %key, origin = ?origin, "Restriction reversed");
        }
        RestrictionEvent::ReversalFailed {
            key,
            origin,
            reason,
        } => {
            error!(key = %key, origin = ?origin, reason = %reason, "Restriction reversal failed");
        }
        RestrictionEvent::TimerArmed { key, expires_at } => {
            info!(key = %key, expires_at = %expires_at, "Reversal timer armed");
        }
    }
}

fn log_report(report: &ReconcileReport) {
    info!(
        reversed = report.reversed.len(),
        rearmed = report.rearmed.len(),
        already_armed = report.already_armed.len(),
        failed = report.failed.len(),
        "Startup reconciliation complete"
    );
    for (key, reason) in &report.failed {
        error!(key = %key, reason = %reason, "Restriction left in place after failed reversal");
    }
}

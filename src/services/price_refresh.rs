use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::cli::ServiceName;
use crate::refresh::RefreshService;
use crate::refresh::status::RunState;
use crate::services::Service;
use crate::state::{ServiceStatus, ServiceStatusRegistry};

/// Lifecycle owner for the price refresh job.
///
/// Runs are started on demand over HTTP; this service reports whether the job
/// can run at all and makes sure an in-flight run is cancelled and recorded
/// before the process exits.
pub struct PriceRefreshService {
    refresh: RefreshService,
    statuses: ServiceStatusRegistry,
    shutdown_timeout: Duration,
}

impl PriceRefreshService {
    pub fn new(
        refresh: RefreshService,
        statuses: ServiceStatusRegistry,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            refresh,
            statuses,
            shutdown_timeout,
        }
    }

    async fn report_startup_state(&self) {
        let missing = self.refresh.missing_configuration();
        if !missing.is_empty() {
            warn!(missing = ?missing, "price refresh disabled until credentials are configured");
            self.statuses.set(self.name(), ServiceStatus::Disabled);
            return;
        }
        self.statuses.set(self.name(), ServiceStatus::Active);

        match self.refresh.report().await {
            Ok(report) if report.status == RunState::Running => {
                info!("a price refresh is marked running by another instance or a previous process");
            }
            Ok(report) => info!(
                status = report.status.as_str(),
                last_refresh = ?report.last_refresh,
                can_refresh = report.can_refresh,
                "price refresh ready"
            ),
            Err(e) => warn!(error = ?e, "could not read price refresh status"),
        }
    }
}

#[async_trait]
impl Service for PriceRefreshService {
    fn name(&self) -> &'static str {
        ServiceName::PriceRefresh.as_str()
    }

    async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        self.report_startup_state().await;

        let _ = shutdown.recv().await;
        info!(service = self.name(), "price refresh received shutdown signal");
        self.refresh.shutdown(self.shutdown_timeout).await;
        Ok(())
    }
}

//! Ingredient price refresh: trigger guard, supervised background run, and
//! the pieces the run is built from.

pub mod candidates;
pub mod extract;
pub mod json;
pub mod orchestrator;
pub mod pacer;
pub mod search;
pub mod status;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use ulid::Ulid;

use crate::data::prices::PriceCatalog;
use crate::refresh::extract::PriceExtractor;
use crate::refresh::orchestrator::{Orchestrator, RefreshDeps};
use crate::refresh::pacer::Pace;
use crate::refresh::search::SearchProvider;
use crate::refresh::status::{RefreshReport, RunState, StatusStore};
use crate::utils::ceil_hours;

/// How often a running job rewrites its status row.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Reasons a refresh request is refused.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Price refresh is not configured (missing {})", .missing.join(", "))]
    Misconfigured { missing: Vec<&'static str> },

    #[error("A price refresh is already running")]
    AlreadyRunning { last_refresh: Option<DateTime<Utc>> },

    #[error("Prices were refreshed recently, try again in {hours_remaining}h")]
    CooldownActive {
        hours_remaining: i64,
        last_refresh: DateTime<Utc>,
    },

    /// The status store could not be read or written.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Timing knobs for the refresh job.
#[derive(Debug, Clone, Copy)]
pub struct RefreshSettings {
    pub cooldown: Duration,
    pub stale_after: Duration,
    pub heartbeat_every: Duration,
}

/// External services the run depends on. `None` means not configured.
#[derive(Clone, Default)]
pub struct RefreshBackends {
    pub search: Option<Arc<dyn SearchProvider>>,
    pub extractor: Option<Arc<dyn PriceExtractor>>,
}

impl RefreshBackends {
    /// Environment variables whose absence disables refreshing.
    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.search.is_none() {
            missing.push("BRAVE_SEARCH_API_KEY");
        }
        if self.extractor.is_none() {
            missing.push("ANTHROPIC_API_KEY");
        }
        missing
    }
}

/// Accepted refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Started {
    pub run_id: Ulid,
}

struct ActiveRun {
    run_id: Ulid,
    /// The supervisor, which records the outcome.
    handle: JoinHandle<()>,
    /// The orchestrator task the supervisor awaits.
    run: AbortHandle,
    cancel: CancellationToken,
}

impl ActiveRun {
    fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }
}

struct Inner {
    status: StatusStore,
    catalog: Arc<dyn PriceCatalog>,
    backends: RefreshBackends,
    pace: Arc<dyn Pace>,
    settings: RefreshSettings,
    active: Mutex<Option<ActiveRun>>,
}

/// Owns the refresh job: admission, the supervised run task, and cancellation.
#[derive(Clone)]
pub struct RefreshService {
    inner: Arc<Inner>,
}

impl RefreshService {
    pub fn new(
        status: StatusStore,
        catalog: Arc<dyn PriceCatalog>,
        backends: RefreshBackends,
        pace: Arc<dyn Pace>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                status,
                catalog,
                backends,
                pace,
                settings,
                active: Mutex::new(None),
            }),
        }
    }

    /// Names of missing credentials; empty when refreshing is possible.
    pub fn missing_configuration(&self) -> Vec<&'static str> {
        self.inner.backends.missing()
    }

    /// Admit a new run and start it in the background.
    ///
    /// Returns as soon as the status is claimed; the run itself reports
    /// through the status store.
    pub async fn request_refresh(&self, force: bool) -> Result<Started, RefreshError> {
        let (Some(search), Some(extractor)) = (
            self.inner.backends.search.clone(),
            self.inner.backends.extractor.clone(),
        ) else {
            return Err(RefreshError::Misconfigured {
                missing: self.inner.backends.missing(),
            });
        };

        let settings = self.inner.settings;
        let mut active = self.inner.active.lock().await;
        let status = self.inner.status.load().await?;
        let now = Utc::now();

        if active.as_ref().is_some_and(ActiveRun::is_live) {
            return Err(RefreshError::AlreadyRunning {
                last_refresh: status.last_refresh,
            });
        }

        if status.state == RunState::Running {
            if !status.is_abandoned(now, settings.stale_after) {
                return Err(RefreshError::AlreadyRunning {
                    last_refresh: status.last_refresh,
                });
            }
            warn!(
                written_at = ?status.state_written_at,
                "Reclaiming abandoned price refresh"
            );
        }

        if !force
            && let Some(remaining) = status.cooldown_remaining(now, settings.cooldown)
            && let Some(last_refresh) = status.last_refresh
        {
            return Err(RefreshError::CooldownActive {
                hours_remaining: ceil_hours(remaining),
                last_refresh,
            });
        }

        if !self.inner.status.try_begin(settings.stale_after).await? {
            return Err(RefreshError::AlreadyRunning {
                last_refresh: status.last_refresh,
            });
        }

        let run_id = Ulid::new();
        let cancel = CancellationToken::new();
        let deps = RefreshDeps {
            catalog: self.inner.catalog.clone(),
            search,
            extractor,
            pace: self.inner.pace.clone(),
        };
        let (handle, run) = self.spawn_supervised(run_id, deps, cancel.clone());

        info!(run_id = %run_id, force, "Price refresh accepted");
        *active = Some(ActiveRun {
            run_id,
            handle,
            run,
            cancel,
        });

        Ok(Started { run_id })
    }

    /// Spawn the run, plus a supervisor that records how it ended. Panics in
    /// the run surface as a `JoinError` and are recorded like any failure.
    fn spawn_supervised(
        &self,
        run_id: Ulid,
        deps: RefreshDeps,
        cancel: CancellationToken,
    ) -> (JoinHandle<()>, AbortHandle) {
        let status = self.inner.status.clone();
        let orchestrator = Orchestrator::new(
            deps,
            status.clone(),
            self.inner.settings.heartbeat_every,
        );
        let span = info_span!("price_refresh", run_id = %run_id);
        let run_span = span.clone();

        let token = cancel.clone();
        let run = tokio::spawn(async move { orchestrator.run(&token).await }.instrument(run_span));
        let run_abort = run.abort_handle();

        let supervisor = tokio::spawn(
            async move {
                let recorded = match run.await {
                    Ok(Ok(summary)) => status.finish(&summary, Utc::now()).await,
                    Ok(Err(e)) => {
                        if cancel.is_cancelled() {
                            warn!(error = %e, "Price refresh cancelled");
                        } else {
                            error!(error = ?e, "Price refresh failed");
                        }
                        status.fail().await
                    }
                    Err(e) => {
                        error!(error = %e, "Price refresh task panicked");
                        status.fail().await
                    }
                };

                if let Err(e) = recorded {
                    error!(error = ?e, "Failed to record price refresh outcome");
                }
            }
            .instrument(span),
        );

        (supervisor, run_abort)
    }

    /// Polling view of the persisted state.
    pub async fn report(&self) -> anyhow::Result<RefreshReport> {
        let status = self.inner.status.load().await?;
        Ok(status.report(Utc::now(), self.inner.settings.cooldown))
    }

    /// Signal the run owned by this process to stop. Returns its id, or
    /// `None` if nothing is running here.
    pub async fn cancel(&self) -> Option<Ulid> {
        let active = self.inner.active.lock().await;
        let run = active.as_ref().filter(|run| run.is_live())?;
        info!(run_id = %run.run_id, "Price refresh cancellation requested");
        run.cancel.cancel();
        Some(run.run_id)
    }

    /// Cancel any in-flight run and wait up to `timeout` for it to record
    /// its outcome.
    pub async fn shutdown(&self, timeout: Duration) {
        let Some(mut run) = self.inner.active.lock().await.take() else {
            return;
        };
        if !run.is_live() {
            return;
        }

        info!(run_id = %run.run_id, "Cancelling price refresh for shutdown");
        run.cancel.cancel();
        if tokio::time::timeout(timeout, &mut run.handle).await.is_err() {
            warn!(run_id = %run.run_id, "Price refresh did not stop in time, marking as error");
            // Neither task may write a late `done` over the `error` below.
            run.handle.abort();
            run.run.abort();
            let _ = run.handle.await;
            if let Err(e) = self.inner.status.fail().await {
                error!(error = ?e, "Failed to record abandoned price refresh");
            }
        }
    }

    /// Wait for the current run (if any) to finish.
    #[cfg(test)]
    pub async fn wait_for_run(&self) {
        let run = self.inner.active.lock().await.take();
        if let Some(run) = run {
            let _ = run.handle.await;
        }
    }
}

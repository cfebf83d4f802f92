//! Persisted price refresh state and its polling projection.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use ts_rs::TS;

use crate::data::kv::KvStore;
use crate::utils::ceil_hours;

// app_kv keys for the refresh pipeline.
pub const KV_STATUS: &str = "price_refresh.status";
pub const KV_LAST_REFRESH: &str = "price_refresh.last_refresh";
pub const KV_SUMMARY: &str = "price_refresh.summary";

/// Lifecycle of the refresh job.
///
/// `Done` and `Error` are quiescent; only a new trigger moves them back to
/// `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum RunState {
    Idle,
    Running,
    Done,
    Error,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Done => "done",
            RunState::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(RunState::Idle),
            "running" => Some(RunState::Running),
            "done" => Some(RunState::Done),
            "error" => Some(RunState::Error),
            _ => None,
        }
    }
}

/// Per-run outcome counters. `updated + failed + skipped == total` for a
/// completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefreshSummary {
    pub updated: u32,
    pub failed: u32,
    pub skipped: u32,
    pub total: u32,
}

impl RefreshSummary {
    pub fn processed(&self) -> u32 {
        self.updated + self.failed + self.skipped
    }
}

/// Snapshot of the persisted refresh state.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshStatus {
    pub state: RunState,
    /// When the status entry was last written (claim, heartbeat, or finish).
    pub state_written_at: Option<DateTime<Utc>>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub summary: Option<RefreshSummary>,
}

impl Default for RefreshStatus {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            state_written_at: None,
            last_refresh: None,
            summary: None,
        }
    }
}

impl RefreshStatus {
    /// Time left in the cooldown window, or `None` if a new run may start.
    pub fn cooldown_remaining(
        &self,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Option<chrono::Duration> {
        let last = self.last_refresh?;
        let cooldown = chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX);
        // A timestamp from the future (clock skew) counts as "just now".
        let elapsed = (now - last).max(chrono::Duration::zero());
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    /// `true` when the status says `running` but has not been written for
    /// longer than `stale_after`, meaning the owning process is gone.
    pub fn is_abandoned(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        if self.state != RunState::Running {
            return false;
        }
        let Some(written_at) = self.state_written_at else {
            return true;
        };
        let stale_after = chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX);
        now - written_at > stale_after
    }

    /// Project the state for pollers. Cooldown fields are independent of `state`.
    pub fn report(&self, now: DateTime<Utc>, cooldown: Duration) -> RefreshReport {
        let remaining = self.cooldown_remaining(now, cooldown);
        RefreshReport {
            status: self.state,
            last_refresh: self.last_refresh,
            can_refresh: remaining.is_none(),
            hours_until_next: remaining.map(ceil_hours).unwrap_or(0),
            summary: self.summary,
        }
    }
}

/// Response for `GET /api/prices/refresh-status`.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RefreshReport {
    pub status: RunState,
    pub last_refresh: Option<DateTime<Utc>>,
    pub can_refresh: bool,
    #[ts(type = "number")]
    pub hours_until_next: i64,
    pub summary: Option<RefreshSummary>,
}

/// Typed access to the refresh keys in the key-value store.
#[derive(Clone)]
pub struct StatusStore {
    kv: Arc<dyn KvStore>,
}

impl StatusStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Read the current state. Missing keys read as idle with no history.
    pub async fn load(&self) -> Result<RefreshStatus> {
        let entry = self.kv.get_entry(KV_STATUS).await?;
        let (state, state_written_at) = match entry {
            None => (RunState::Idle, None),
            Some(entry) => {
                let state = RunState::parse(&entry.value).unwrap_or_else(|| {
                    warn!(value = %entry.value, "Unrecognized refresh status, treating as idle");
                    RunState::Idle
                });
                (state, Some(entry.updated_at))
            }
        };

        let last_refresh = self.kv.get_timestamp(KV_LAST_REFRESH).await?;

        let summary = match self.kv.get(KV_SUMMARY).await? {
            None => None,
            Some(raw) => match serde_json::from_str::<RefreshSummary>(&raw) {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!(error = %e, "Discarding unparseable refresh summary");
                    None
                }
            },
        };

        Ok(RefreshStatus {
            state,
            state_written_at,
            last_refresh,
            summary,
        })
    }

    /// Atomically move to `running`. Returns `false` if a live run already
    /// holds the status.
    pub async fn try_begin(&self, stale_after: Duration) -> Result<bool> {
        self.kv
            .claim(KV_STATUS, RunState::Running.as_str(), stale_after)
            .await
    }

    /// Rewrite `running` so other instances can see the run is alive.
    pub async fn heartbeat(&self) -> Result<()> {
        self.kv.set(KV_STATUS, RunState::Running.as_str()).await
    }

    /// Record a completed run. Summary and timestamp are written before the
    /// status so a poller that sees `done` also sees the new summary.
    pub async fn finish(&self, summary: &RefreshSummary, at: DateTime<Utc>) -> Result<()> {
        let encoded = serde_json::to_string(summary).context("Failed to encode summary")?;
        self.kv.set(KV_SUMMARY, &encoded).await?;
        self.kv.set_timestamp(KV_LAST_REFRESH, at).await?;
        self.kv.set(KV_STATUS, RunState::Done.as_str()).await
    }

    /// Record a fatal run failure. `lastRefresh` is left alone so the cooldown
    /// does not penalize a hard failure.
    pub async fn fail(&self) -> Result<()> {
        self.kv.set(KV_STATUS, RunState::Error.as_str()).await
    }
}

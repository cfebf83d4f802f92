//! Application state shared across services and handlers.

use crate::data::prices::PriceCatalog;
use crate::refresh::RefreshService;
use dashmap::DashMap;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use ts_rs::TS;

/// Health status of a service.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ServiceStatus {
    Starting,
    Active,
    Disabled,
    Error,
}

/// A timestamped status entry for a service.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub status: ServiceStatus,
    pub updated_at: Instant,
}

/// Thread-safe registry for services to self-report their health status.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatusRegistry {
    inner: Arc<DashMap<String, StatusEntry>>,
}

impl ServiceStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates the status for a named service.
    pub fn set(&self, name: &str, status: ServiceStatus) {
        self.inner.insert(
            name.to_owned(),
            StatusEntry {
                status,
                updated_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<ServiceStatus> {
        self.inner.get(name).map(|entry| entry.status)
    }

    /// Snapshot of all services with the seconds since each last reported.
    pub fn all(&self) -> Vec<(String, ServiceStatus, u64)> {
        self.inner
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().status,
                    entry.value().updated_at.elapsed().as_secs(),
                )
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub catalog: Arc<dyn PriceCatalog>,
    pub refresh: RefreshService,
    pub service_statuses: ServiceStatusRegistry,
}

impl AppState {
    pub fn new(
        db_pool: PgPool,
        catalog: Arc<dyn PriceCatalog>,
        refresh: RefreshService,
        service_statuses: ServiceStatusRegistry,
    ) -> Self {
        Self {
            db_pool,
            catalog,
            refresh,
            service_statuses,
        }
    }
}

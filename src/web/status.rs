//! Health and status handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{trace, warn};
use ts_rs::TS;

use crate::data::health;
use crate::state::{AppState, ServiceStatus};

#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct HealthResponse {
    status: String,
    database: String,
    timestamp: String,
}

#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ServiceInfo {
    name: String,
    status: ServiceStatus,
    #[ts(type = "number")]
    seconds_since_update: u64,
}

#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StatusResponse {
    status: ServiceStatus,
    version: String,
    commit: String,
    services: BTreeMap<String, ServiceInfo>,
    /// Credentials the price refresh still needs; empty when fully configured.
    refresh_missing: Vec<String>,
}

/// Health check endpoint. Unhealthy (503) when the database is unreachable.
pub(super) async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    trace!("health check requested");
    let (code, status, database) = match health::ping(&state.db_pool).await {
        Ok(()) => (StatusCode::OK, "healthy", "ok"),
        Err(e) => {
            warn!(error = ?e, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", "unreachable")
        }
    };
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            database: database.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }),
    )
}

/// Combine per-service states into one.
fn overall_status(services: &BTreeMap<String, ServiceInfo>) -> ServiceStatus {
    if services.is_empty() {
        ServiceStatus::Disabled
    } else if services.values().any(|s| s.status == ServiceStatus::Error) {
        ServiceStatus::Error
    } else if services.values().any(|s| s.status == ServiceStatus::Starting) {
        ServiceStatus::Starting
    } else {
        ServiceStatus::Active
    }
}

/// Status endpoint showing per-service state and build info
pub(super) async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let services: BTreeMap<String, ServiceInfo> = state
        .service_statuses
        .all()
        .into_iter()
        .map(|(name, status, seconds_since_update)| {
            (
                name.clone(),
                ServiceInfo {
                    name,
                    status,
                    seconds_since_update,
                },
            )
        })
        .collect();

    Json(StatusResponse {
        status: overall_status(&services),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("GIT_COMMIT_SHORT").to_string(),
        services,
        refresh_missing: state
            .refresh
            .missing_configuration()
            .into_iter()
            .map(String::from)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::testing::{TestApp, send};
    use axum::http::Method;

    #[tokio::test]
    async fn status_reports_registered_services() {
        let app = TestApp::configured();
        app.state
            .service_statuses
            .set("web", ServiceStatus::Active);
        app.state
            .service_statuses
            .set("price-refresh", ServiceStatus::Disabled);

        let (code, body) = send(&app.router, Method::GET, "/api/status", None).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], "active");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["services"]["web"]["status"], "active");
        assert_eq!(body["services"]["price-refresh"]["status"], "disabled");
        assert_eq!(body["refreshMissing"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn status_surfaces_missing_credentials_and_errors() {
        let app = TestApp::unconfigured();
        app.state.service_statuses.set("web", ServiceStatus::Error);

        let (_, body) = send(&app.router, Method::GET, "/api/status", None).await;
        assert_eq!(body["status"], "error");
        assert_eq!(
            body["refreshMissing"],
            serde_json::json!(["BRAVE_SEARCH_API_KEY", "ANTHROPIC_API_KEY"])
        );
    }

    #[test]
    fn no_services_is_disabled() {
        assert_eq!(overall_status(&BTreeMap::new()), ServiceStatus::Disabled);
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let app = TestApp::configured();
        let response = tower::ServiceExt::oneshot(
            app.router.clone(),
            axum::http::Request::builder()
                .uri("/api/status")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
        let id = response.headers().get("x-request-id").unwrap();
        assert_eq!(id.to_str().unwrap().len(), 26);
    }
}

//! JSON error responses for the HTTP API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::error;
use ts_rs::TS;

use crate::refresh::RefreshError;

/// Machine-readable error code carried in every error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ApiErrorCode {
    InvalidBody,
    NotConfigured,
    AlreadyRunning,
    CooldownActive,
    NotRunning,
    InternalError,
}

impl ApiErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidBody => StatusCode::BAD_REQUEST,
            ApiErrorCode::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::AlreadyRunning | ApiErrorCode::CooldownActive => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiErrorCode::NotRunning => StatusCode::CONFLICT,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response: `{"error": message, "code": CODE, ...details}`.
#[derive(Debug)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    details: Map<String, Value>,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Attach an extra top-level field to the body.
    pub fn with_detail(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.details.insert(key.to_owned(), value);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::InvalidBody, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::InternalError, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = Map::new();
        body.insert("error".into(), Value::String(self.message));
        body.insert(
            "code".into(),
            serde_json::to_value(self.code).unwrap_or(Value::Null),
        );
        body.extend(self.details);
        (self.code.status(), Json(Value::Object(body))).into_response()
    }
}

/// Log a store failure with its full chain and hide it behind a generic 500.
pub fn db_error(context: &str, e: anyhow::Error) -> ApiError {
    error!(error = ?e, "{context} failed");
    ApiError::internal_error(format!("{context} failed"))
}

impl From<RefreshError> for ApiError {
    fn from(err: RefreshError) -> Self {
        let message = err.to_string();
        match err {
            RefreshError::Misconfigured { missing } => {
                ApiError::new(ApiErrorCode::NotConfigured, message).with_detail("missing", missing)
            }
            RefreshError::AlreadyRunning { last_refresh } => {
                ApiError::new(ApiErrorCode::AlreadyRunning, message)
                    .with_detail("lastRefresh", last_refresh)
            }
            RefreshError::CooldownActive {
                hours_remaining,
                last_refresh,
            } => ApiError::new(ApiErrorCode::CooldownActive, message)
                .with_detail("lastRefresh", last_refresh)
                .with_detail("hoursRemaining", hours_remaining),
            RefreshError::Store(e) => db_error("Refresh status lookup", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use chrono::{TimeZone, Utc};

    async fn body_of(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn cooldown_maps_to_429_with_hours() {
        let last = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let (status, body) = body_of(
            RefreshError::CooldownActive {
                hours_remaining: 5,
                last_refresh: last,
            }
            .into(),
        )
        .await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "COOLDOWN_ACTIVE");
        assert_eq!(body["hoursRemaining"], 5);
        assert_eq!(body["lastRefresh"], "2026-03-01T12:00:00Z");
        assert!(body["error"].as_str().unwrap().contains("5h"));
    }

    #[tokio::test]
    async fn already_running_has_no_hours() {
        let (status, body) =
            body_of(RefreshError::AlreadyRunning { last_refresh: None }.into()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "ALREADY_RUNNING");
        assert!(body["lastRefresh"].is_null());
        assert!(body.get("hoursRemaining").is_none());
    }

    #[tokio::test]
    async fn misconfigured_lists_missing_keys() {
        let (status, body) = body_of(
            RefreshError::Misconfigured {
                missing: vec!["ANTHROPIC_API_KEY"],
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "NOT_CONFIGURED");
        assert_eq!(body["missing"], serde_json::json!(["ANTHROPIC_API_KEY"]));
    }

    #[tokio::test]
    async fn store_failure_hides_details() {
        let (status, body) = body_of(
            RefreshError::Store(anyhow::anyhow!("connection refused to 10.0.0.5")).into(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert!(!body["error"].as_str().unwrap().contains("10.0.0.5"));
    }
}

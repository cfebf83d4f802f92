//! Price refresh trigger, polling and automatic price listing.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::data::models::AutomaticPrice;
use crate::refresh::status::RefreshReport;
use crate::state::AppState;
use crate::web::error::{ApiError, ApiErrorCode, db_error};

#[derive(Debug, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[ts(export)]
pub struct RefreshRequest {
    /// Skip the cooldown check. Never skips the running check.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RefreshStarted {
    pub status: String,
    pub run_id: String,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RefreshCancelling {
    pub status: String,
    pub run_id: String,
}

/// The body is optional; an empty body means `{"force": false}`.
fn parse_refresh_request(body: &[u8]) -> Result<RefreshRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RefreshRequest::default());
    }
    let de = &mut serde_json::Deserializer::from_slice(body);
    serde_path_to_error::deserialize(de).map_err(|e| {
        let path = e.path().to_string();
        ApiError::bad_request(format!("Invalid refresh request at {path}: {}", e.inner()))
    })
}

/// `POST /api/prices/refresh`
pub(super) async fn request_refresh(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RefreshStarted>, ApiError> {
    let request = parse_refresh_request(&body)?;
    let started = state.refresh.request_refresh(request.force).await?;
    Ok(Json(RefreshStarted {
        status: "started".to_string(),
        run_id: started.run_id.to_string(),
    }))
}

/// `GET /api/prices/refresh-status`
pub(super) async fn refresh_status(
    State(state): State<AppState>,
) -> Result<Json<RefreshReport>, ApiError> {
    let report = state
        .refresh
        .report()
        .await
        .map_err(|e| db_error("Refresh status lookup", e))?;
    Ok(Json(report))
}

/// `POST /api/prices/refresh/cancel`
pub(super) async fn cancel_refresh(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RefreshCancelling>), ApiError> {
    let run_id = state.refresh.cancel().await.ok_or_else(|| {
        ApiError::new(
            ApiErrorCode::NotRunning,
            "No price refresh is running on this instance",
        )
    })?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RefreshCancelling {
            status: "cancelling".to_string(),
            run_id: run_id.to_string(),
        }),
    ))
}

/// `GET /api/prices/automatic`
pub(super) async fn automatic_prices(
    State(state): State<AppState>,
) -> Result<Json<Vec<AutomaticPrice>>, ApiError> {
    let prices = state
        .catalog
        .list_automatic_prices()
        .await
        .map_err(|e| db_error("Automatic price listing", e))?;
    Ok(Json(prices))
}

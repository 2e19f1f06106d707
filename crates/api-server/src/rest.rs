//! Shared handler state, error helpers and operational endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use goldstone_analytics::{LogData, SearchBackend, SearchError};
use goldstone_core::{RawParams, ValidatedParams};
use goldstone_management::ApiError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Shared application state for the analytics handlers.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn SearchBackend>,
    pub index: String,
    pub node_id: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn log_data(&self) -> LogData {
        LogData::new(self.backend.clone(), self.index.clone())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub fn search_failed(e: SearchError) -> ApiError {
    ApiError::BadGateway(e.to_string())
}

/// Run [`goldstone_core::params::validate`] and turn failures into a 400.
pub fn validated(required: &[goldstone_core::Param], raw: &RawParams) -> ApiResult<ValidatedParams> {
    goldstone_core::params::validate(required, raw).map_err(|errors| {
        warn!(errors = ?errors, "Rejected request parameters");
        ApiError::Validation(errors)
    })
}

/// `(start, end)` of params validated with both required.
pub fn window(params: &ValidatedParams) -> ApiResult<(DateTime<Utc>, DateTime<Utc>)> {
    match (params.start, params.end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(ApiError::Internal("time window missing after validation".into())),
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

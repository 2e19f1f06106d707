//! HTTP error mapping shared by every Goldstone handler.

use crate::models::ErrorResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use goldstone_core::GoldstoneError;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    /// 400 with a bare JSON list of messages.
    Validation(Vec<String>),
    NotFound(String),
    Conflict(String),
    Unauthorized(String),
    Forbidden(String),
    /// The search backend failed or answered with something unusable.
    BadGateway(String),
    Internal(String),
}

impl From<GoldstoneError> for ApiError {
    fn from(e: GoldstoneError) -> Self {
        match e {
            GoldstoneError::Validation(errors) => ApiError::Validation(errors),
            GoldstoneError::NotFound(what) => ApiError::NotFound(what),
            GoldstoneError::Conflict(what) => ApiError::Conflict(what),
            GoldstoneError::Search(msg) => ApiError::BadGateway(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

fn body(status: StatusCode, error: &str, message: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message,
        }),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => {
                metrics::counter!("api.validation_errors").increment(1);
                (StatusCode::BAD_REQUEST, Json(errors)).into_response()
            }
            ApiError::NotFound(msg) => body(StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => body(StatusCode::CONFLICT, "conflict", msg),
            ApiError::Unauthorized(msg) => body(StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden(msg) => body(StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::BadGateway(msg) => {
                error!(error = %msg, "Search backend failure");
                metrics::counter!("api.search_errors").increment(1);
                body(StatusCode::BAD_GATEWAY, "search_failed", msg)
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                metrics::counter!("api.errors").increment(1);
                body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal processing error".to_string(),
                )
            }
        }
    }
}

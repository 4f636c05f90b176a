//! HTTP API handlers for steeltrack-server

pub mod activity;
pub mod actor;
pub mod buildinfo;
pub mod crews;
pub mod deliveries;
pub mod health;
pub mod piece_marks;
pub mod sse;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use steeltrack_common::Error;
use tracing::error;

/// HTTP wrapper around the common error taxonomy
///
/// Every rejection body carries the machine-readable `error` kind and the
/// message naming the specific rule or invariant violated, so clients never
/// see a generic failure.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) | Error::IncompleteReconciliation { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::InvalidTransition { .. }
            | Error::LocationLockedAfterInstall
            | Error::OverReceipt { .. }
            | Error::ConcurrentModification => StatusCode::CONFLICT,
            Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {}", self.0);
        }

        let body = Json(json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        }));

        (status, body).into_response()
    }
}

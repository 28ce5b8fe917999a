//! JSON envelopes and error mapping for the admin surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::error::{ErrorKind, WalletError};

/// `{"data": ...}` with 200.
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(json!({ "data": data }))).into_response()
}

/// Error surfaced as `{"error": {"kind", "message"}}`.
#[derive(Debug)]
pub struct ApiError(pub WalletError);

impl<E> From<E> for ApiError
where
    E: Into<WalletError>,
{
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyRunning
        | ErrorKind::NotRunning
        | ErrorKind::SweepInFlight
        | ErrorKind::StaleCursor => StatusCode::CONFLICT,
        ErrorKind::InsufficientFunds | ErrorKind::InsufficientForGas => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::ConnectionError => StatusCode::BAD_GATEWAY,
        ErrorKind::NoClientAvailable | ErrorKind::KeyUnavailable | ErrorKind::GasPriceTooHigh => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ErrorKind::Config | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_body(kind: ErrorKind, message: String) -> serde_json::Value {
    json!({ "error": { "kind": kind, "message": message } })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!(%kind, error = %self.0, "Admin request failed");
        } else {
            tracing::debug!(%kind, error = %self.0, "Admin request rejected");
        }
        (status, Json(error_body(kind, self.0.to_string()))).into_response()
    }
}

pub type ApiResult = Result<Response, ApiError>;

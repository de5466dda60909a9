//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use memo_core::{Error, ErrorClass};
use serde::Serialize;

/// Error body: `{"code": <status>, "message": <text>}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            message: message.into(),
        }
    }

    fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match (&err, err.class()) {
            (Error::Timeout { .. }, _) => StatusCode::GATEWAY_TIMEOUT,
            (Error::IndexNotReady { .. }, _) => StatusCode::SERVICE_UNAVAILABLE,
            (_, ErrorClass::Client) => StatusCode::BAD_REQUEST,
            (_, ErrorClass::NotFound) => StatusCode::NOT_FOUND,
            (_, ErrorClass::Server) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

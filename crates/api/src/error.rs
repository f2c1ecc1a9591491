//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::ErrorKind;

use crate::gateway::GatewayError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The request body was not a resolver call.
    BadRequest(String),
    /// The gateway rejected or failed the call.
    Gateway(GatewayError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) => ErrorKind::Validation,
            ApiError::Gateway(err) => err.kind(),
        }
    }

    fn status(&self) -> StatusCode {
        if let ApiError::Gateway(GatewayError::Timeout(_)) = self {
            return StatusCode::GATEWAY_TIMEOUT;
        }
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::PreconditionFailed => StatusCode::CONFLICT,
            ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "{msg}"),
            ApiError::Gateway(err) => write!(f, "{err}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind().as_str(),
        });
        (status, axum::Json(body)).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError::Gateway(err)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use domain::{DomainError, OrderStatus};
    use record_store::RecordStoreError;

    use super::*;

    #[test]
    fn status_follows_error_kind() {
        let cases = [
            (
                ApiError::BadRequest("not json".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::UnknownField("x".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::Domain(DomainError::InvalidTransition {
                    from: OrderStatus::Shipped,
                    to: OrderStatus::Cancelled,
                })
                .into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::Domain(DomainError::Store(RecordStoreError::Unavailable(
                    "down".into(),
                )))
                .into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                GatewayError::Timeout(Duration::from_millis(5)).into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status(), expected, "{error}");
        }
    }
}

// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use confab_signal::SignalError;

/// Result type for HTTP handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// An error delivered to the client in-band.
///
/// Signaling clients poll over plain HTTP and inspect the body, not the
/// status code, so every error is serialized as `{"error": <message>}` with
/// HTTP 200. Changing this to real status codes would break deployed
/// clients.
#[derive(Debug)]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn login_required() -> Self {
        Self::new("login required")
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (StatusCode::OK, body).into_response()
    }
}

impl From<SignalError> for ApiError {
    fn from(err: SignalError) -> Self {
        if let SignalError::Engine(ref engine_err) = err {
            tracing::error!("engine error: {engine_err}");
        }
        Self::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let json = serde_json::to_string(&ErrorResponse {
            error: "not connected".to_string(),
        })
        .expect("serialize");
        assert_eq!(json, r#"{"error":"not connected"}"#);
    }

    #[test]
    fn test_signal_error_conversion() {
        let err: ApiError = SignalError::NotConnected.into();
        assert_eq!(err.message, "not connected");
    }
}

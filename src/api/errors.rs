use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Error-shaped bodies. Every variant is sent with `200 OK` so clients only ever
/// branch on the `status` field.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest { message: String, trace: String },
    Unexpected { message: String, trace: String },
    ResultsUnavailable,
}

impl ApiError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::BadRequest { trace: message.clone(), message }
    }

    /// Keeps the underlying error's debug chain as the `trace`.
    pub(crate) fn bad_request_from(err: impl std::fmt::Debug, message: &str) -> Self {
        Self::BadRequest { message: message.to_string(), trace: format!("{err:?}") }
    }

    /// Log the underlying error with context and return an `Unexpected` variant.
    pub(crate) fn unexpected(err: impl std::fmt::Display + std::fmt::Debug, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Unexpected { message: format!("{context}: {err}"), trace: format!("{err:?}") }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self {
            ApiError::BadRequest { message, trace } => {
                tracing::warn!(error = %message, "Rejected evaluate request");
                ErrorResponse { status: "error", message, trace: Some(trace) }
            }
            ApiError::Unexpected { message, trace } => {
                ErrorResponse { status: "error", message, trace: Some(trace) }
            }
            ApiError::ResultsUnavailable => ErrorResponse {
                status: "error",
                message: "Cannot fetch results".to_string(),
                trace: None,
            },
        };

        (StatusCode::OK, Json(body)).into_response()
    }
}

//! HTTP error responses.
//!
//! Handlers return `Result<T, ApiError>`. Client errors carry their message
//! to the caller; conversion failures only expose `details` and `stack` when
//! the server is not running in production mode.

use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The caller sent an invalid or incomplete request.
    #[error("{error}: {details}")]
    BadRequest { error: String, details: String },

    /// Upload exceeded the configured limit.
    #[error("File size exceeds the {limit_mb}MB limit")]
    PayloadTooLarge { limit_mb: usize },

    /// Rendering or encoding failed.
    #[error("Conversion failed: {source}")]
    Conversion {
        #[source]
        source: crate::Error,
        verbose: bool,
    },

    /// Anything else that went wrong on our side.
    #[error("internal error: {message}")]
    Internal { message: String, verbose: bool },
}

impl ApiError {
    pub fn bad_request(error: impl Into<String>, details: impl Into<String>) -> Self {
        ApiError::BadRequest {
            error: error.into(),
            details: details.into(),
        }
    }

    /// Map a library error; input errors stay client errors.
    pub fn conversion(source: crate::Error, verbose: bool) -> Self {
        if source.is_client_error() {
            return ApiError::bad_request("Invalid options", source.to_string());
        }
        ApiError::Conversion { source, verbose }
    }

    pub fn internal(message: impl Into<String>, verbose: bool) -> Self {
        ApiError::Internal {
            message: message.into(),
            verbose,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Conversion { .. } | ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Source chain of an error, outermost first, one per line.
fn error_chain(err: &dyn StdError) -> String {
    let mut lines = vec![err.to_string()];
    let mut current = err.source();
    while let Some(cause) = current {
        lines.push(format!("caused by: {}", cause));
        current = cause.source();
    }
    lines.join("\n")
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = Map::new();

        match &self {
            ApiError::BadRequest { error, details } => {
                body.insert("error".into(), json!(error));
                body.insert("details".into(), json!(details));
            }
            ApiError::PayloadTooLarge { .. } => {
                body.insert("error".into(), json!(self.to_string()));
            }
            ApiError::Conversion { source, verbose } => {
                error!(error = %source, "API Error");
                body.insert("error".into(), json!("Conversion failed"));
                if *verbose {
                    body.insert("details".into(), json!(source.to_string()));
                    body.insert("stack".into(), json!(error_chain(&self)));
                }
            }
            ApiError::Internal { message, verbose } => {
                error!(message = %message, "internal server error");
                body.insert("error".into(), json!("Internal server error"));
                if *verbose {
                    body.insert("details".into(), json!(message));
                }
            }
        }

        (status, Json(Value::Object(body))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn bad_request_shape() {
        let (status, body) = body_of(ApiError::bad_request("No input provided", "Please provide either a file upload or URL")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No input provided");
        assert_eq!(body["details"], "Please provide either a file upload or URL");
    }

    #[tokio::test]
    async fn conversion_details_only_when_verbose() {
        let err = || crate::Error::RenderError("Failed to load HTML: net::ERR_FAILED".into());

        let (status, body) = body_of(ApiError::conversion(err(), true)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Conversion failed");
        assert!(body["details"].as_str().unwrap().contains("ERR_FAILED"));
        assert!(body["stack"].as_str().unwrap().contains("caused by"));

        let (_, body) = body_of(ApiError::conversion(err(), false)).await;
        assert_eq!(body["error"], "Conversion failed");
        assert!(body.get("details").is_none());
        assert!(body.get("stack").is_none());
    }

    #[tokio::test]
    async fn invalid_options_are_client_errors() {
        let (status, _) = body_of(ApiError::conversion(crate::Error::InvalidOptions("fps".into()), false)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn too_large_names_limit() {
        let (status, body) = body_of(ApiError::PayloadTooLarge { limit_mb: 50 }).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "File size exceeds the 50MB limit");
    }
}

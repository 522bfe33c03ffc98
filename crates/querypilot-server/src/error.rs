//! HTTP-facing errors.
//!
//! Every failure a handler returns becomes `{code, message}` with a matching
//! status. The precondition variants carry the exact sentence the UI shows.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// The assistant is switched off.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Missing or malformed input, including a data source without a schema.
    #[error("{0}")]
    BadRequest(String),

    /// No API key is configured.
    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("Failed to generate query: {0}")]
    Generation(#[source] querypilot_agent::AgentError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Opening or reading a SQLite data source failed.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServerError {
    /// A `400` for a required request field that is missing or blank.
    pub fn missing_field(field: &str) -> Self {
        ServerError::BadRequest(format!("{} is required.", field))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Generation(_)
            | ServerError::Internal(_)
            | ServerError::Serialization(_)
            | ServerError::Storage(_)
            | ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Forbidden(_) => "forbidden",
            ServerError::NotFound(_) => "not_found",
            ServerError::BadRequest(_) => "bad_request",
            ServerError::ServiceUnavailable(_) => "service_unavailable",
            ServerError::Generation(_) => "generation_failed",
            ServerError::Internal(_) => "internal_error",
            ServerError::Serialization(_) => "serialization_error",
            ServerError::Storage(_) => "storage_error",
            ServerError::Config(_) => "config_error",
        }
    }
}

impl From<querypilot_config::ConfigError> for ServerError {
    fn from(e: querypilot_config::ConfigError) -> Self {
        ServerError::Config(e.to_string())
    }
}

impl From<rusqlite::Error> for ServerError {
    fn from(e: rusqlite::Error) -> Self {
        ServerError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(%status, code = body.code, error = %body.message, "Request failed");
        } else {
            tracing::warn!(%status, code = body.code, error = %body.message, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_client_errors_keep_message_verbatim() {
        let response = ServerError::missing_field("data_source_id").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["code"], "bad_request");
        assert_eq!(body["message"], "data_source_id is required.");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (ServerError::Forbidden("off".into()), StatusCode::FORBIDDEN),
            (ServerError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (
                ServerError::ServiceUnavailable("no key".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ServerError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_generation_error_message() {
        let error = ServerError::Generation(querypilot_agent::AgentError::EmptyResponse);
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .starts_with("Failed to generate query: ")
        );
    }
}

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error response type
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code, e.g. `todo_not_found`
    pub error: String,
    pub message: String,
}

/// Response type for health check endpoint
#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
}

/// Response type for unhealthy status
#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct UnhealthyResponse {
    pub status: String,
    pub error: String,
}

/// Custom error type for API endpoints
///
/// Every variant maps to one HTTP status and one error code. Client errors
/// carry their message back to the caller as-is; server-side variants are
/// logged when turned into a response.
#[derive(Debug)]
pub enum ApiError {
    /// Request body was not a valid create request
    InvalidJson(String),
    /// Request body exceeded the extractor size limit
    PayloadTooLarge(String),
    /// Request body parsed but failed validation
    InvalidInput(String),
    /// No record stored for this id
    TodoNotFound(String),
    /// Stored record bytes are not a todo
    Decode { id: String, source: serde_json::Error },
    /// Underlying store operation failed
    Store(anyhow::Error),
    /// Index could not be read or parsed
    IndexRead(anyhow::Error),
    /// Index could not be written back
    IndexWrite(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidJson(_) | ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::TodoNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Decode { .. }
            | ApiError::Store(_)
            | ApiError::IndexRead(_)
            | ApiError::IndexWrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidJson(_) => "invalid_json",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::TodoNotFound(_) => "todo_not_found",
            ApiError::Decode { .. } => "decode_error",
            ApiError::Store(_) => "store_error",
            ApiError::IndexRead(_) => "read_index_error",
            ApiError::IndexWrite(_) => "write_index_error",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::InvalidJson(msg) => format!("Invalid JSON body: {}", msg),
            ApiError::PayloadTooLarge(msg) => format!("Request body too large: {}", msg),
            ApiError::InvalidInput(msg) => msg.clone(),
            ApiError::TodoNotFound(id) => format!("Todo not found: {}", id),
            ApiError::Decode { id, source } => {
                format!("Stored todo {} could not be decoded: {}", id, source)
            }
            ApiError::Store(err) => format!("Store error: {:#}", err),
            ApiError::IndexRead(err) => format!("Index read error: {:#}", err),
            ApiError::IndexWrite(err) => format!("Index write error: {:#}", err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();

        match &self {
            ApiError::Decode { id, .. } => {
                tracing::error!(todo_id = %id, "Data integrity: {}", message);
            }
            _ if status.is_server_error() => tracing::error!("{}: {}", self.code(), message),
            _ => tracing::debug!("{}: {}", self.code(), message),
        }

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::InvalidJson(rejection.body_text())
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Store(err)
    }
}

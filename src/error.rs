use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{auth::AuthError, history::PersistenceError, llm::LlmError, normalize::MALFORMED_MESSAGE};

pub const UNAVAILABLE_MESSAGE: &str = "AI service unavailable, try again later.";
pub const RECOVERY_SUGGESTION: &str = "Please try again in 30 seconds";

/// Errors surfaced by HTTP handlers, rendered as `{ success: false, error }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation error: {message}")]
    Validation { message: String, example: Option<serde_json::Value> },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] LlmError),
    #[error("malformed model output")]
    MalformedModelOutput,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), example: None }
    }

    pub fn missing_weather_or_occasion() -> Self {
        Self::Validation {
            message: "Missing required parameters: weather and occasion".into(),
            example: Some(json!({ "weather": "Rainy", "occasion": "Business Meeting" })),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Validation { message, example } => {
                let mut body = json!({ "success": false, "error": message });
                if let Some(example) = example {
                    body["exampleRequest"] = example.clone();
                }
                (StatusCode::BAD_REQUEST, body)
            }
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "success": false, "error": msg })),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "success": false, "error": msg })),
            Self::Conflict(msg) => (StatusCode::BAD_REQUEST, json!({ "success": false, "error": msg })),
            Self::UpstreamUnavailable(e) => {
                tracing::error!("🚨 Model API error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "error": UNAVAILABLE_MESSAGE, "recoverySuggestion": RECOVERY_SUGGESTION }),
                )
            }
            Self::MalformedModelOutput => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "success": false, "error": MALFORMED_MESSAGE }),
            ),
            Self::Internal(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "success": false, "error": "Server Error" }))
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials => Self::Unauthorized("Invalid credentials".into()),
            AuthError::MissingToken => Self::Unauthorized("Not authorized, no token".into()),
            AuthError::InvalidToken => Self::Unauthorized("Not authorized, token failed".into()),
            AuthError::UserExists => Self::Conflict("User already exists".into()),
            AuthError::UserNotFound => Self::NotFound("User not found".into()),
            AuthError::Invalid(msg) => Self::validation(msg),
            AuthError::Hashing(msg) => Self::Internal(msg),
        }
    }
}

impl From<PersistenceError> for ApiError {
    fn from(error: PersistenceError) -> Self {
        match error {
            PersistenceError::EntryNotFound(_) => Self::NotFound("Recommendation not found".into()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

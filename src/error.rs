use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

use crate::secrets::SecretError;

#[derive(Debug, ThisError)]
pub enum DriveError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("Secret storage error: {0}")]
    Secret(#[from] SecretError),

    /// Required settings absent. Raised before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Token exchange/refresh failed or a required token is missing.
    /// For failed provider responses the message is the raw response body.
    #[error("auth error: {0}")]
    Auth(String),

    /// Non-2xx from the Drive API, carrying the provider's status and body.
    #[error("Drive API error ({status}): {body}")]
    RemoteApi { status: u16, body: String },

    /// Folder mapping or target subfolder missing while auto-creation is off.
    #[error("{0}")]
    IntegrationState(String),
}

impl DriveError {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, DriveError::RemoteApi { status: 403, .. })
    }
}

impl IntoResponse for DriveError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            DriveError::Configuration(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "CONFIGURATION".to_string(),
                    message: msg,
                },
            ),
            DriveError::Auth(msg) => (
                StatusCode::UNAUTHORIZED,
                ApiErrorBody {
                    code: "AUTH".to_string(),
                    message: msg,
                },
            ),
            DriveError::RemoteApi { status, body } => {
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                (
                    status,
                    ApiErrorBody {
                        code: "REMOTE_API".to_string(),
                        message: body,
                    },
                )
            }
            DriveError::IntegrationState(msg) => (
                StatusCode::CONFLICT,
                ApiErrorBody {
                    code: "INTEGRATION_STATE".to_string(),
                    message: msg,
                },
            ),
            DriveError::Reqwest(_) | DriveError::UrlParse(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody {
                    code: "BAD_GATEWAY".to_string(),
                    message: "Upstream service is unavailable.".to_string(),
                },
            ),
            DriveError::Json(_)
            | DriveError::Io(_)
            | DriveError::Database(_)
            | DriveError::Secret(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                },
            ),
        };
        (status, Json(ApiErrorResponse { error: error_body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_api_display_carries_status_and_body() {
        let err = DriveError::RemoteApi {
            status: 403,
            body: "insufficient permissions".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Drive API error (403): insufficient permissions"
        );
        assert!(err.is_forbidden());
    }

    #[test]
    fn only_403_counts_as_forbidden() {
        let err = DriveError::RemoteApi {
            status: 500,
            body: "boom".to_string(),
        };
        assert!(!err.is_forbidden());
        assert!(!DriveError::Auth("not connected".into()).is_forbidden());
    }
}

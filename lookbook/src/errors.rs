use crate::clients::{ReplicateError, StorageError};
use crate::db::errors::DbError;
use crate::images::ImageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use utoipa::ToSchema;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Conflict with existing state, carrying a machine-readable code for clients to branch on
    #[error("Conflict: {message}")]
    Conflict { message: String, code: String },

    /// The user cannot afford the requested operation
    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: i64, available: i64 },

    /// Upstream model refused the input on content-moderation grounds
    #[error("Content rejected: {message}")]
    SensitiveContent { message: String },

    /// A third-party service failed
    #[error("{service} failed: {message}")]
    Upstream { service: String, message: String },

    /// The operation did not reach a terminal state in time
    #[error("Timed out: {message}")]
    Timeout { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// JSON body returned for every failed request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,
    pub code: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            Error::SensitiveContent { .. } => StatusCode::BAD_REQUEST,
            Error::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code included in the response envelope
    pub fn code(&self) -> String {
        match self {
            Error::BadRequest { .. } => "VALIDATION_ERROR".to_string(),
            Error::NotFound { .. } => "NOT_FOUND".to_string(),
            Error::Conflict { code, .. } => code.clone(),
            Error::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS".to_string(),
            Error::SensitiveContent { .. } => "SENSITIVE_CONTENT".to_string(),
            Error::Upstream { .. } => "UPSTREAM_ERROR".to_string(),
            Error::Timeout { .. } => "GENERATION_TIMEOUT".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "NOT_FOUND".to_string(),
                DbError::UniqueViolation { .. } => "CONFLICT".to_string(),
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => "VALIDATION_ERROR".to_string(),
                DbError::Other(_) => "INTERNAL_ERROR".to_string(),
            },
            Error::Internal { .. } | Error::Other(_) => "INTERNAL_ERROR".to_string(),
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Conflict { message, .. } => message.clone(),
            Error::InsufficientCredits { .. } => "Not enough credits to start a generation".to_string(),
            Error::SensitiveContent { .. } => {
                "The image or prompt was flagged as sensitive content. Please try a different photo or prompt.".to_string()
            }
            Error::Upstream { service, .. } if service == "replicate" => {
                "Image generation failed. Your credit has not been charged.".to_string()
            }
            Error::Upstream { .. } => "An upstream service is unavailable. Please try again.".to_string(),
            Error::Timeout { .. } => "Image generation timed out. Please try again.".to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { table, .. } => match table.as_deref() {
                    Some("user_favorite_locations") => "Location is already in favorites".to_string(),
                    Some("users") => "A user for this device already exists".to_string(),
                    _ => "Resource already exists".to_string(),
                },
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            success: false,
            message: self.user_message(),
            code: self.code(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Upstream { .. } | Error::Timeout { .. } => {
                tracing::error!("Upstream error: {}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Conflict { .. } | Error::SensitiveContent { .. } => {
                tracing::warn!("Request rejected: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } | Error::InsufficientCredits { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), Json(self.envelope())).into_response()
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

impl From<ReplicateError> for Error {
    fn from(err: ReplicateError) -> Self {
        Error::Upstream {
            service: "replicate".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Upstream {
            service: "storage".to_string(),
            message: err.to_string(),
        }
    }
}

/// Undecodable or oversized uploads are the client's fault; encoding failures are ours
impl From<ImageError> for Error {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::Encode(_) => Error::Internal {
                operation: format!("encode image: {err}"),
            },
            other => Error::BadRequest {
                message: other.to_string(),
            },
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_codes() {
        let conflict = Error::Conflict {
            message: "Location is already in favorites".to_string(),
            code: "ALREADY_FAVORITED".to_string(),
        };
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(conflict.code(), "ALREADY_FAVORITED");

        let sensitive = Error::SensitiveContent {
            message: "E005".to_string(),
        };
        assert_eq!(sensitive.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(sensitive.code(), "SENSITIVE_CONTENT");

        let credits = Error::InsufficientCredits { required: 1, available: 0 };
        assert_eq!(credits.status_code(), StatusCode::PAYMENT_REQUIRED);

        let timeout = Error::Timeout {
            message: "prediction".to_string(),
        };
        assert_eq!(timeout.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_internal_details_not_leaked() {
        let err = Error::Upstream {
            service: "replicate".to_string(),
            message: "token r8_secret rejected".to_string(),
        };
        let envelope = err.envelope();
        assert!(!envelope.success);
        assert_eq!(envelope.code, "UPSTREAM_ERROR");
        assert!(!envelope.message.contains("r8_secret"));

        let err = Error::Database(DbError::Other(anyhow::anyhow!("connection refused on 10.0.0.3")));
        assert!(!err.user_message().contains("10.0.0.3"));
    }

    #[test]
    fn test_client_error_conversions() {
        let err = Error::from(ImageError::UnsupportedFormat);
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(err.user_message(), "Unsupported image format");

        let err = Error::from(ReplicateError::MissingToken);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "UPSTREAM_ERROR");
    }

    #[tokio::test]
    async fn test_into_response_writes_envelope() {
        let response = Error::NotFound {
            resource: "Generation".to_string(),
            id: "abc".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let envelope: ErrorEnvelope = serde_json::from_slice(&body).unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.code, "NOT_FOUND");
        assert_eq!(envelope.message, "Generation with ID abc not found");
    }
}

//! Typed errors raised by the task engine and identity layer.
//!
//! The REST boundary maps each variant to a status code and renders the
//! uniform `{"success": false, "message": "..."}` body. Internal errors are
//! logged with their full chain but surface only a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing or malformed input — 400.
    #[error("{0}")]
    Validation(String),
    /// Missing, invalid, or expired credentials — 401.
    #[error("{0}")]
    Unauthorized(String),
    /// Caller lacks the right to perform this action — 403.
    #[error("{0}")]
    Forbidden(String),
    /// Entity absent, or not owned by the caller — 404.
    #[error("{0}")]
    NotFound(String),
    /// Duplicate unique field — surfaced as 400, distinct from validation.
    #[error("{0}")]
    Conflict(String),
    /// Anything unexpected from storage or plumbing — 500, message redacted.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        // SQLite UNIQUE violations come back as database errors; everything
        // else is an internal failure.
        if let sqlx::Error::Database(ref db) = e {
            if db.is_unique_violation() {
                return Self::Conflict("duplicate field value".to_string());
            }
        }
        Self::Internal(e.into())
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(e) => {
                error!(err = ?e, "internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(json!({ "success": false, "message": message }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            EngineError::validation("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EngineError::conflict("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EngineError::unauthorized("x").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(EngineError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(EngineError::not_found("x").status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_message_is_redacted() {
        let err = EngineError::Internal(anyhow::anyhow!("secret path /var/db"));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! Error taxonomy shared by every handler.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    /// The referenced entity has no backing row.
    #[error("{0}")]
    NotFound(String),

    /// Authenticated, but lacking the required membership or role.
    #[error("{0}")]
    Forbidden(String),

    /// Malformed input, duplicates, mismatched confirmations.
    #[error("{0}")]
    BadRequest(String),

    /// Missing, invalid or expired session or one-time token.
    #[error("{0}")]
    Unauthorized(String),

    /// Anything unexpected, including failures of external collaborators.
    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Internal error with a client-facing message other than the generic one.
    pub fn internal(msg: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Internal {
            message: msg.into(),
            source,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(source: anyhow::Error) -> Self {
        Self::internal("Internal server error", source)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        Self::internal("Internal server error", e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Internal { message, source } = &self {
            error!(error = ?source, %message, "request failed");
        }
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

/// True when a unique constraint (SQLSTATE 23505) rejected the write somewhere in `e`'s chain.
pub fn is_unique_violation(e: &anyhow::Error) -> bool {
    e.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|db| db.as_database_error())
            .map_or(false, |db| db.is_unique_violation())
    })
}

/// Plain `{message}` body for successful operations that return no entity.
pub fn message(msg: &str) -> crate::extract::Json<serde_json::Value> {
    crate::extract::Json(json!({ "message": msg }))
}

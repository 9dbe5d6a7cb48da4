use std::time::Duration;

use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::models::SyncKey;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Target authorization failed: {0}")]
    TargetAuth(String),

    #[error("Target unavailable: {0}")]
    TargetUnavailable(String),

    /// Downstream throttling (429), with the wait the server asked for.
    #[error("Target rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Database error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Malformed record {key}: {reason}")]
    MalformedRecord { key: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("A sync run is already in progress")]
    SyncInProgress,

    #[error("Not found")]
    NotFound,
}

impl AppError {
    pub fn malformed(key: impl ToString, reason: impl Into<String>) -> Self {
        AppError::MalformedRecord {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Transient downstream failures are the only retryable kind.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::TargetUnavailable(_) | AppError::RateLimited { .. }
        )
    }

    /// Errors that abort a run even when raised for a single record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Storage(_) | AppError::Migration(_) | AppError::Config(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::SourceUnavailable(_) => "source_unavailable",
            AppError::TargetAuth(_) => "target_auth",
            AppError::TargetUnavailable(_) => "target_unavailable",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::Storage(_) => "storage",
            AppError::Migration(_) => "migration",
            AppError::MalformedRecord { .. } => "malformed_record",
            AppError::Config(_) => "config",
            AppError::SyncInProgress => "sync_in_progress",
            AppError::NotFound => "not_found",
        }
    }
}

/// A per-record failure recorded in the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub key: SyncKey,
    pub kind: &'static str,
    pub message: String,
}

impl RecordFailure {
    pub fn new(key: SyncKey, err: &AppError) -> Self {
        Self {
            key,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found".to_string()),
            AppError::SyncInProgress => (StatusCode::CONFLICT, self.to_string()),
            AppError::SourceUnavailable(_)
            | AppError::TargetAuth(_)
            | AppError::TargetUnavailable(_)
            | AppError::RateLimited { .. } => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Storage(e) => {
                error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                )
            }
            AppError::Migration(e) => {
                error!("migration error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                )
            }
            AppError::MalformedRecord { .. } | AppError::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message: error_message,
        });

        (status, body).into_response()
    }
}

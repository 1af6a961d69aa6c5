//! Error types for server operations.
//!
//! `DbError` adapts sqlx failures into the storage contract's
//! [`StoreError`]; `ApiError` is what HTTP handlers return.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use flowrun_workflow::StoreError;
use rootcause::prelude::Report;
use std::fmt;

/// Maps a sqlx error to a backend storage failure.
pub fn backend(error: sqlx::Error) -> Report<StoreError> {
    match error {
        sqlx::Error::Decode(reason) => StoreError::Decode {
            entity: "row",
            reason: reason.to_string(),
        }
        .into(),
        other => StoreError::Backend {
            reason: other.to_string(),
        }
        .into(),
    }
}

/// Builds a decode error for a stored JSON column.
pub fn decode(entity: &'static str, error: &serde_json::Error) -> Report<StoreError> {
    StoreError::Decode {
        entity,
        reason: error.to_string(),
    }
    .into()
}

/// Builds a backend error for a value that could not be serialized.
pub fn encode(entity: &'static str, error: &serde_json::Error) -> Report<StoreError> {
    StoreError::Backend {
        reason: format!("failed to encode {entity}: {error}"),
    }
    .into()
}

/// Wraps an id parse failure as a sqlx decode error.
pub fn invalid_id(kind: &str, raw: &str, error: impl fmt::Display) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("invalid {kind} id '{raw}': {error}"),
    )))
}

/// Errors returned by HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    /// A path segment could not be parsed.
    InvalidPath { segment: &'static str, value: String },
    /// The request was well-formed but is not acceptable.
    Rejected { details: String },
    /// The referenced record does not exist.
    NotFound { entity: &'static str, id: String },
    /// The workflow has no credential, so no run was started.
    NotStarted { workflow_id: String },
    /// An unexpected failure, already logged.
    Internal { details: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPath { segment, value } => {
                write!(f, "invalid {segment} '{value}'")
            }
            Self::Rejected { details } => write!(f, "rejected: {details}"),
            Self::NotFound { entity, id } => write!(f, "{entity} '{id}' not found"),
            Self::NotStarted { workflow_id } => {
                write!(f, "workflow '{workflow_id}' has no access credential")
            }
            Self::Internal { details } => write!(f, "internal error: {details}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Logs `report` and returns an opaque internal error.
    pub fn internal(report: impl fmt::Display) -> Self {
        let details = report.to_string();
        tracing::error!(error = %details, "request failed");
        Self::Internal { details }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidPath { .. } | Self::Rejected { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::NotStarted { .. } => StatusCode::CONFLICT,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self {
            Self::Internal { .. } => "Internal server error".to_string(),
            other => other.to_string(),
        };
        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_details_are_not_exposed() {
        let response = ApiError::Internal {
            details: "password=hunter2".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::NotFound {
            entity: "workflow",
            id: "wf_1".to_string(),
        };
        assert_eq!(err.to_string(), "workflow 'wf_1' not found");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn decode_errors_keep_their_kind() {
        let report = backend(invalid_id("trigger", "nope", "bad ulid"));
        assert!(report.to_string().contains("failed to decode stored row"));
    }
}

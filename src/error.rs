use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::{
    dao::{models::RecordError, storage::StorageError},
    state::{AbortError, ApplyError, PlanError},
};

/// Errors raised by the match and sync services.
///
/// Actions the reducer declines (read-only replay, empty undo stack…) are
/// not errors; they come back as ignored outcomes.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The match store refused or failed the operation.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// No match store is connected.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// The request is well formed but cannot be honoured.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The session is in the wrong phase for this operation.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// No match is being recorded or replayed.
    #[error("no active match")]
    NoActiveMatch,
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// A session transition did not complete in time.
    #[error("operation timed out")]
    Timeout,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<RecordError> for ServiceError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::MissingRemoteId => ServiceError::InvalidState(err.to_string()),
            other => ServiceError::Unavailable(StorageError::corrupt(other.to_string())),
        }
    }
}

impl From<PlanError> for ServiceError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::AlreadyPending => {
                ServiceError::InvalidState("another session change is in progress".into())
            }
            PlanError::InvalidTransition(invalid) => {
                ServiceError::InvalidState(invalid.to_string())
            }
        }
    }
}

impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::NoPending => {
                ServiceError::InvalidState("no session change is pending".into())
            }
            ApplyError::IdMismatch { .. } => {
                ServiceError::InvalidState("pending session change does not match".into())
            }
            ApplyError::PhaseMismatch { expected, actual } => ServiceError::InvalidState(format!(
                "session changed underneath (expected {expected:?}, got {actual:?})"
            )),
            ApplyError::VersionMismatch { expected, actual } => {
                ServiceError::InvalidState(format!(
                    "session version mismatch (expected {expected}, got {actual})"
                ))
            }
        }
    }
}

impl From<AbortError> for ServiceError {
    fn from(err: AbortError) -> Self {
        match err {
            AbortError::NoPending => {
                ServiceError::InvalidState("no session change to abort".into())
            }
            AbortError::IdMismatch { .. } => {
                ServiceError::InvalidState("session change to abort does not match".into())
            }
        }
    }
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or invalid payload.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// No live match, or unknown saved match.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation not allowed in the current session phase.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Match store unreachable; the operation may be retried.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// A stored record could not be used.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::ServiceUnavailable(_) => "unavailable",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source @ StorageError::Corrupt { .. }) => {
                AppError::Internal(source.to_string())
            }
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NoActiveMatch => AppError::NotFound("no active match".into()),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Timeout => AppError::ServiceUnavailable("operation timed out".into()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let payload = Json(ErrorBody {
            error: self.code(),
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_are_retryable_but_corruption_is_not() {
        let offline = AppError::from(ServiceError::Unavailable(StorageError::unavailable(
            "connection refused".into(),
            std::io::Error::other("refused"),
        )));
        assert_eq!(offline.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(offline.to_string().contains("connection refused"));

        let corrupt = AppError::from(ServiceError::from(RecordError::EmptyRoster(
            uuid::Uuid::nil(),
        )));
        assert_eq!(corrupt.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_match_is_not_found() {
        let err = AppError::from(ServiceError::NoActiveMatch);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn unsaved_record_is_a_conflict() {
        let err = AppError::from(ServiceError::from(RecordError::MissingRemoteId));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}

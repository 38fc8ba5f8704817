use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::{lifecycle::LifecycleError, store::SequenceLocked},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

/// Reasons a room refused a client request. Only the originating client is told.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateRejection {
    /// The lifecycle forbids the request in the current phase.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// The sequence store refused the mutation.
    #[error(transparent)]
    Locked(#[from] SequenceLocked),
    /// The player is not part of the match.
    #[error("unknown player `{0}`")]
    UnknownPlayer(String),
    /// A full sequence replacement left a player out.
    #[error("sequence replacement is missing player `{0}`")]
    MissingPlayer(String),
    /// An append carried no events.
    #[error("append requires at least one event")]
    EmptyAppend,
    /// The client sent an update before joining a match.
    #[error("join a match before sending updates")]
    NotJoined,
    /// The match does not exist.
    #[error("match `{0}` not found")]
    UnknownMatch(Uuid),
    /// The room shut down while the request was in flight.
    #[error("match room closed; join again")]
    RoomClosed,
    /// The room could not be opened.
    #[error("{0}")]
    Unavailable(String),
}

impl From<ServiceError> for UpdateRejection {
    fn from(err: ServiceError) -> Self {
        UpdateRejection::Unavailable(err.to_string())
    }
}

impl From<UpdateRejection> for AppError {
    fn from(rejection: UpdateRejection) -> Self {
        match rejection {
            UpdateRejection::UnknownMatch(_) => AppError::NotFound(rejection.to_string()),
            UpdateRejection::RoomClosed | UpdateRejection::Unavailable(_) => {
                AppError::ServiceUnavailable(rejection.to_string())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

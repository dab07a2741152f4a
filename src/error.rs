use thiserror::Error;

use crate::context::ContextError;
use crate::event_sourcing::{ReplayError, RepositoryError, StoreError};
use crate::messaging::CommandBusError;

// ============================================================================
// Application Error Taxonomy
// ============================================================================
//
// Terminal outcome of a command dispatch. Transports (HTTP/gRPC) translate
// the variant into their own status codes.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("temporarily disabled: {0}")]
    TemporaryDisabled(String),
}

impl AppError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        AppError::Internal(err.to_string())
    }

    /// HTTP status code a REST transport should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Invalid(_) => 400,
            AppError::Unauthorized(_) => 401,
            AppError::Forbidden(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::Internal(_) => 500,
            AppError::Timeout(_) => 408,
            AppError::TemporaryDisabled(_) => 503,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Invalid(_) => "invalid",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Internal(_) => "internal",
            AppError::Timeout(_) => "timeout",
            AppError::TemporaryDisabled(_) => "temporary_disabled",
        }
    }
}

impl From<AppError> for tonic::Status {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Invalid(msg) => tonic::Status::invalid_argument(msg),
            AppError::Unauthorized(msg) => tonic::Status::unauthenticated(msg),
            AppError::Forbidden(msg) => tonic::Status::permission_denied(msg),
            AppError::NotFound(msg) => tonic::Status::not_found(msg),
            AppError::Internal(msg) => tonic::Status::internal(msg),
            AppError::Timeout(msg) => tonic::Status::deadline_exceeded(msg),
            AppError::TemporaryDisabled(msg) => tonic::Status::unavailable(msg),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::NotFound(err.to_string()),
            StoreError::DuplicateEvent(_) | StoreError::VersionConflict { .. } => {
                AppError::Invalid(err.to_string())
            }
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<ReplayError> for AppError {
    fn from(err: ReplayError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Store(err) => err.into(),
            RepositoryError::Replay(err) => err.into(),
            RepositoryError::Context(err) => err.into(),
            RepositoryError::Publish(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<ContextError> for AppError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::DeadlineExceeded => AppError::Timeout(err.to_string()),
            ContextError::Cancelled => AppError::Internal(err.to_string()),
        }
    }
}

impl From<CommandBusError> for AppError {
    fn from(err: CommandBusError) -> Self {
        match err {
            CommandBusError::HandlerNotFound(_) => AppError::Invalid(err.to_string()),
            CommandBusError::ResultDropped(_) => AppError::Internal(err.to_string()),
        }
    }
}

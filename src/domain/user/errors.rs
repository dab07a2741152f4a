use crate::error::AppError;

// ============================================================================
// User Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("User already registered")]
    AlreadyRegistered,

    #[error("User is not registered")]
    NotRegistered,

    #[error("Email address is unchanged")]
    EmailUnchanged,

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::Serialization(_) => AppError::Internal(err.to_string()),
            _ => AppError::Invalid(err.to_string()),
        }
    }
}

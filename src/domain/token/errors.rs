use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token already exists")]
    AlreadyCreated,

    #[error("Token does not exist")]
    NotCreated,

    #[error("Token was already removed")]
    AlreadyRemoved,

    #[error("Access token cannot be empty")]
    EmptyAccess,

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Serialization(_) => AppError::Internal(err.to_string()),
            _ => AppError::Invalid(err.to_string()),
        }
    }
}

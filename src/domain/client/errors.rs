use crate::error::AppError;

// ============================================================================
// Client Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Client already exists")]
    AlreadyCreated,

    #[error("Client does not exist")]
    NotCreated,

    #[error("Client was already removed")]
    AlreadyRemoved,

    #[error("Client secret cannot be empty")]
    EmptySecret,

    #[error("Client domain cannot be empty")]
    EmptyDomain,

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Serialization(_) => AppError::Internal(err.to_string()),
            _ => AppError::Invalid(err.to_string()),
        }
    }
}

use thiserror::Error;

/// Errors that are safe to expose to views and other modules
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Backend write failed: {message}")]
    BackendWrite { message: String },

    #[error("Backend read failed: {message}")]
    BackendRead { message: String },

    #[error("Not signed in")]
    Unauthenticated,

    #[error("No user profile for uid '{uid}'")]
    ProfileNotFound { uid: String },
}

impl AccessError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn backend_write(message: impl Into<String>) -> Self {
        Self::BackendWrite {
            message: message.into(),
        }
    }

    pub fn backend_read(message: impl Into<String>) -> Self {
        Self::BackendRead {
            message: message.into(),
        }
    }
}

impl From<crate::domain::error::DomainError> for AccessError {
    fn from(domain_error: crate::domain::error::DomainError) -> Self {
        use crate::domain::error::DomainError::*;
        match domain_error {
            InvalidArgument { field, message } => {
                Self::invalid_argument(format!("{}: {}", field, message))
            }
            BackendWrite {
                collection,
                op,
                message,
            } => Self::backend_write(format!("{} {}: {}", op, collection, message)),
            BackendRead {
                collection,
                message,
            } => Self::backend_read(format!("{}: {}", collection, message)),
            InvalidQuery(e) => Self::invalid_argument(e.to_string()),
            Unauthenticated => Self::Unauthenticated,
            ProfileNotFound { uid } => Self::ProfileNotFound { uid },
        }
    }
}

use thiserror::Error;

/// Domain-specific errors using thiserror
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid argument '{field}': {message}")]
    InvalidArgument { field: String, message: String },

    #[error("Write to '{collection}' failed during {op}: {message}")]
    BackendWrite {
        collection: String,
        op: &'static str,
        message: String,
    },

    #[error("Read from '{collection}' failed: {message}")]
    BackendRead { collection: String, message: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] query_core::Error),

    #[error("No signed-in principal")]
    Unauthenticated,

    #[error("No user profile for uid '{uid}'")]
    ProfileNotFound { uid: String },
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn missing_id() -> Self {
        Self::invalid_argument("id", "must not be empty")
    }

    pub fn backend_write(
        collection: impl Into<String>,
        op: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::BackendWrite {
            collection: collection.into(),
            op,
            message: message.into(),
        }
    }

    pub fn backend_read(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendRead {
            collection: collection.into(),
            message: message.into(),
        }
    }

    pub fn profile_not_found(uid: impl Into<String>) -> Self {
        Self::ProfileNotFound { uid: uid.into() }
    }
}

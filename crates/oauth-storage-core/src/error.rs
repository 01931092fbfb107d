// Storage error type shared by every backend.
//
// Not-found is never an error: capability operations return `Option::None` or
// `false` for missing records. Everything in here is a genuine failure the
// caller has to handle differently from "no such record".

/// Errors raised by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Caller-supplied configuration or parameter is outside the accepted set.
    /// Raised before any state is mutated.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is part of the contract but the backend does not provide it.
    #[error("{operation}() for the {backend} backend is currently unimplemented")]
    Unimplemented {
        operation: &'static str,
        backend: &'static str,
    },

    /// Transient or driver-level failure of the underlying store.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    pub fn unimplemented(operation: &'static str, backend: &'static str) -> Self {
        Self::Unimplemented { operation, backend }
    }

    /// Whether this error came from the store itself rather than the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// Unified result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unimplemented_message_names_operation_and_backend() {
        let err = StorageError::unimplemented("get_jti", "redis");
        assert_eq!(
            err.to_string(),
            "get_jti() for the redis backend is currently unimplemented"
        );
    }

    #[test]
    fn test_only_backend_errors_are_transient() {
        assert!(StorageError::backend("connection reset").is_transient());
        assert!(!StorageError::invalid_argument("bad type").is_transient());
        assert!(!StorageError::unimplemented("set_jti", "mongodb").is_transient());
    }

    #[test]
    fn test_serialization_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: StorageError = parse.into();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}

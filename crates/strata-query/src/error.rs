use thiserror::Error;

/// Boxed driver error carried as the source of a [`DataError::Backend`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for all adapter operations
#[derive(Error, Debug)]
pub enum DataError {
    /// Key or identifier absent on read
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed query descriptor or operation arguments.
    /// Always raised before any network call.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Operation not supported by this backend
    #[error("Operation not supported: {0}")]
    OperationNotSupported(String),

    /// Network or driver failure, never retried by the adapter
    #[error("Backend error: {context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: BoxError,
    },

    /// Value not representable in the backend wire format
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Required configuration key missing from every source
    #[error("Missing configuration key: {0}")]
    MissingConfigKey(String),
}

impl DataError {
    /// Create a "not found" error with custom message
    pub fn not_found(msg: impl Into<String>) -> Self {
        DataError::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        DataError::Validation(msg.into())
    }

    /// Create an operation not supported error
    pub fn operation_not_supported(msg: impl Into<String>) -> Self {
        DataError::OperationNotSupported(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        DataError::InvalidConfiguration(msg.into())
    }

    /// Wrap a driver error with the operation it interrupted
    pub fn backend<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        DataError::Backend {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DataError::Validation(_))
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_backend_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = DataError::backend("Failed to connect to PostgreSQL", io);

        assert!(err.to_string().contains("Failed to connect to PostgreSQL"));
        assert!(err.to_string().contains("refused"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_kind_helpers() {
        assert!(DataError::not_found("k").is_not_found());
        assert!(DataError::validation("bad").is_validation());
        assert!(!DataError::validation("bad").is_not_found());
    }

    #[test]
    fn test_serde_json_error_maps_to_serialization() {
        let err: DataError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, DataError::Serialization(_)));
    }
}

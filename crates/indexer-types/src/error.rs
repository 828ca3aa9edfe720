//! Error types shared by the indexer crates.

use thiserror::Error;

/// Errors raised while building or validating indexer values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    /// A value was rejected at the call boundary
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TypesError::InvalidArgument("normal delay must be >= 0".to_string());
        assert_eq!(err.to_string(), "Invalid argument: normal delay must be >= 0");

        let err = TypesError::Config("missing index_path".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing index_path");
    }
}

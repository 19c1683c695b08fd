use thiserror::Error;

/// Core error types for parcelflow operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid data parcel manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid participant: {0}")]
    InvalidParticipant(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

impl CoreError {
    /// Create a new InvalidArgument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a new InvalidManifest error
    pub fn invalid_manifest(message: impl Into<String>) -> Self {
        Self::InvalidManifest(message.into())
    }

    /// Create a new InvalidParticipant error
    pub fn invalid_participant(message: impl Into<String>) -> Self {
        Self::InvalidParticipant(message.into())
    }

    /// Create a new InvalidTimestamp error
    pub fn invalid_timestamp(message: impl Into<String>) -> Self {
        Self::InvalidTimestamp(message.into())
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument(_) => ErrorCategory::Argument,
            Self::InvalidManifest(_) => ErrorCategory::Manifest,
            Self::InvalidParticipant(_) => ErrorCategory::Participant,
            Self::InvalidTimestamp(_) => ErrorCategory::Timestamp,
        }
    }
}

/// Which part of the caller's input was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Argument,
    Manifest,
    Participant,
    Timestamp,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Argument => write!(f, "argument"),
            Self::Manifest => write!(f, "manifest"),
            Self::Participant => write!(f, "participant"),
            Self::Timestamp => write!(f, "timestamp"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_error() {
        let err = CoreError::invalid_argument("participant must not be empty");
        assert_eq!(
            err.to_string(),
            "Invalid argument: participant must not be empty"
        );
        assert_eq!(err.category(), ErrorCategory::Argument);
    }

    #[test]
    fn test_invalid_manifest_error() {
        let err = CoreError::invalid_manifest("no descriptor");
        assert!(err.to_string().contains("no descriptor"));
        assert_eq!(err.category(), ErrorCategory::Manifest);
    }

    #[test]
    fn test_invalid_participant_error() {
        let err = CoreError::invalid_participant("component id is empty");
        assert_eq!(err.category(), ErrorCategory::Participant);
        assert_eq!(err.category().to_string(), "participant");
    }

    #[test]
    fn test_error_categories_display() {
        assert_eq!(ErrorCategory::Argument.to_string(), "argument");
        assert_eq!(ErrorCategory::Manifest.to_string(), "manifest");
        assert_eq!(ErrorCategory::Timestamp.to_string(), "timestamp");
    }
}

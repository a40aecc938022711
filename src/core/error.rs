use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors surfaced by the storage orchestration layer
///
/// The first block is the operation-level taxonomy handed to callers. The
/// rest describe failures of the collaborators underneath and are wrapped
/// into an operation-level variant before they leave an orchestration call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// No wallet account has been connected yet
    #[error("No active account or signer available")]
    SignerUnavailable,

    /// The wallet refused to produce a signature
    #[error("Signature denied: {0}")]
    SignatureDenied(String),

    /// Chain queries issued before a network connection exists
    #[error("Chain API not initialized")]
    ApiNotReady,

    /// Deposit or bucket creation failed
    #[error("Bucket provisioning failed: {0}")]
    ProvisionFailed(String),

    /// Reading or writing the directory index failed
    #[error("Directory index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Share failed: {0}")]
    ShareFailed(String),

    /// A well-known name has not been registered in the bucket yet
    #[error("Cannot resolve CNS name: \"{0}\"")]
    NameNotFound(String),

    /// A guarded write lost against a newer version of the same name
    #[error("Version conflict on \"{0}\"")]
    Conflict(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Transport errors
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid arguments
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl VaultError {
    /// Whether this error already belongs to the operation-level taxonomy
    pub fn is_operation_error(&self) -> bool {
        matches!(
            self,
            VaultError::SignerUnavailable
                | VaultError::SignatureDenied(_)
                | VaultError::ApiNotReady
                | VaultError::ProvisionFailed(_)
                | VaultError::IndexUnavailable(_)
                | VaultError::UploadFailed(_)
                | VaultError::DownloadFailed(_)
                | VaultError::ShareFailed(_)
        )
    }

    /// Keep operation-level errors, wrap everything else with `wrap`
    pub fn or_wrap(self, wrap: impl FnOnce(String) -> VaultError) -> VaultError {
        if self.is_operation_error() {
            self
        } else {
            wrap(self.to_string())
        }
    }
}

// Convert from other error types
impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for VaultError {
    fn from(err: reqwest::Error) -> Self {
        VaultError::Network(err.to_string())
    }
}

impl From<url::ParseError> for VaultError {
    fn from(err: url::ParseError) -> Self {
        VaultError::InvalidArgument(format!("Invalid URL: {}", err))
    }
}

impl From<crate::core::config::ConfigError> for VaultError {
    fn from(err: crate::core::config::ConfigError) -> Self {
        VaultError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_errors_pass_through() {
        let err = VaultError::IndexUnavailable("boom".to_string());
        assert_eq!(err.clone().or_wrap(VaultError::UploadFailed), err);
    }

    #[test]
    fn test_collaborator_errors_are_wrapped() {
        let err = VaultError::Network("connection reset".to_string())
            .or_wrap(VaultError::UploadFailed);
        assert_eq!(
            err,
            VaultError::UploadFailed("Network error: connection reset".to_string())
        );
    }

    #[test]
    fn test_name_not_found_message() {
        let err = VaultError::NameNotFound("fs".to_string());
        assert_eq!(err.to_string(), "Cannot resolve CNS name: \"fs\"");
    }
}

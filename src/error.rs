//! Error types for the harness.

use crate::schema::ProvisioningError;
use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for harness operations
#[derive(Debug, Error)]
pub enum Error {
    /// Dialect name not in the catalog
    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),

    /// Database or schema creation failed
    #[error("Provisioning failed: {0}")]
    Provisioning(#[from] ProvisioningError),

    /// Operation not valid in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// プロビジョニング段階の失敗か
    pub fn is_provisioning(&self) -> bool {
        matches!(self, Error::Provisioning(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseError;

    #[test]
    fn test_error_messages() {
        let err = Error::UnsupportedDialect("oracle".to_string());
        assert_eq!(err.to_string(), "Unsupported dialect: oracle");

        let err: Error = ProvisioningError::Database(DatabaseError::ConnectionFailed(
            "refused".to_string(),
        ))
        .into();
        assert!(err.is_provisioning());
        assert!(err.to_string().contains("refused"));
    }
}

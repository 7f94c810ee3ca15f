//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success - operation completed (an empty result is still success)
//! - `1`: General error - unspecified failure
//! - `2`: Blocking error - the store is unreadable and needs manual repair
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::error::ServiceError;
use crate::storage::StoreError;

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Critical error that should halt automation (code 2)
    BlockingError = 2,

    /// Request rejected before any side effect (code 3)
    InvalidRequest = 3,

    /// Embedding provider failed (code 4)
    ProviderError = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Clustering could not be computed (code 7)
    ClusteringError = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl ExitCode {
    /// Convert a `ServiceError` to the appropriate exit code.
    ///
    /// Maps specific error types to semantic exit codes that scripts
    /// can use to determine appropriate recovery actions.
    pub fn from_error(error: &ServiceError) -> Self {
        match error {
            ServiceError::Validation(_) => ExitCode::InvalidRequest,
            ServiceError::Provider(_) => ExitCode::ProviderError,

            // An unreadable store is a blocking error
            ServiceError::Store(StoreError::Corrupted { .. })
            | ServiceError::Store(StoreError::UnsupportedVersion { .. }) => {
                ExitCode::BlockingError
            }
            ServiceError::Store(StoreError::Io(_)) => ExitCode::IoError,
            ServiceError::Store(_) => ExitCode::GeneralError,

            ServiceError::Clustering(_) => ExitCode::ClusteringError,
            ServiceError::Config { .. } => ExitCode::ConfigError,
            ServiceError::TaskFailed { .. } => ExitCode::GeneralError,
        }
    }

    /// Check if this exit code indicates a blocking error.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError)
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking error - automation should halt",
            ExitCode::InvalidRequest => "Invalid request",
            ExitCode::ProviderError => "Embedding provider error",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::ClusteringError => "Clustering error",
        }
    }
}

//! CLI-specific error types and exit code mapping

use deploycheck_core::error::DeploycheckError;
use deploycheck_verifier::VerifierError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// One or more scenarios failed.
    #[error("verification failed: {0}")]
    ScenarioFailed(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from deploycheck-core.
    #[error("{0}")]
    Core(#[from] DeploycheckError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                  |
    /// |------|--------------------------|
    /// | 0    | Success                  |
    /// | 1    | General / command error  |
    /// | 2    | Configuration error      |
    /// | 3    | A scenario failed        |
    /// | 10   | IO error                 |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(DeploycheckError::Config(_)) => 2,
            Self::ScenarioFailed(_) => 3,
            Self::Io(_) | Self::Core(DeploycheckError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<VerifierError> for CliError {
    fn from(e: VerifierError) -> Self {
        Self::Core(e.into())
    }
}

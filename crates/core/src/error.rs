//! Error types -- per-domain error definitions

/// deploycheck top-level error type
#[derive(Debug, thiserror::Error)]
pub enum DeploycheckError {
    /// Configuration error
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A scenario step failed (command, assertion, timeout)
    #[error("scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file does not exist
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// Configuration could not be parsed
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A configuration value is out of range or malformed
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Scenario-level failure, as surfaced to callers outside the verifier.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// An external command exited non-zero or could not be run
    #[error("command failed: {0}")]
    Command(String),

    /// The expected cluster state was not observed
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// The expected state was not reached before the deadline
    #[error("timed out: {0}")]
    Timeout(String),

    /// The run was cancelled
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Tunnel or HTTP traffic failure
    #[error("network error: {0}")]
    Network(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_includes_field() {
        let err = ConfigError::InvalidValue {
            field: "wait.timeout_secs".to_owned(),
            reason: "must be greater than 0".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("wait.timeout_secs"));
        assert!(msg.contains("must be greater than 0"));
    }

    #[test]
    fn scenario_error_converts_to_top_level() {
        let err: DeploycheckError = ScenarioError::Assertion("pods not running".to_owned()).into();
        assert!(matches!(
            err,
            DeploycheckError::Scenario(ScenarioError::Assertion(_))
        ));
        assert!(err.to_string().contains("pods not running"));
    }

    #[test]
    fn io_error_converts_to_top_level() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: DeploycheckError = io.into();
        assert!(matches!(err, DeploycheckError::Io(_)));
    }
}

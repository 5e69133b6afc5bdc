//! Verifier error types
//!
//! [`VerifierError`] covers every failure a scenario step can produce.
//! `From<VerifierError> for DeploycheckError` is implemented so callers can
//! propagate with `?`.
//!
//! The taxonomy follows the scenario contract:
//! - a non-zero exit is fatal and carries the captured stderr
//! - an unobserved state is fatal and carries the captured stdout
//! - cleanup failures never become errors (they are logged by the verifier)

use std::time::Duration;

use deploycheck_core::error::{ConfigError, DeploycheckError, ScenarioError};

/// Verifier domain error
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    /// The program could not be started (usually: not on PATH)
    #[error("failed to spawn '{program}': {reason}")]
    Spawn {
        /// Program name
        program: String,
        /// OS error text
        reason: String,
    },

    /// The command ran and exited non-zero
    #[error("'{command}' exited with {}: {stderr}", exit_display(.exit_code))]
    CommandFailed {
        /// Rendered command line
        command: String,
        /// Exit code, `None` if terminated by a signal
        exit_code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// The command exceeded its timeout and was killed
    #[error("'{command}' did not finish within {timeout:?}")]
    CommandTimeout {
        /// Rendered command line
        command: String,
        /// Applied timeout
        timeout: Duration,
    },

    /// An expected state was not observed
    #[error("{step}: {detail}")]
    Assertion {
        /// Scenario step that asserted
        step: String,
        /// What was expected and what was observed
        detail: String,
    },

    /// Polling reached its deadline
    #[error("timed out after {waited:?} waiting for {what} (last observed: {last_observed})")]
    Timeout {
        /// What was being waited for
        what: String,
        /// Elapsed time
        waited: Duration,
        /// Last observation, for diagnosis
        last_observed: String,
    },

    /// The run was cancelled while waiting
    #[error("cancelled while waiting for {0}")]
    Cancelled(String),

    /// Port-forward tunnel could not be established
    #[error("tunnel error: {0}")]
    Tunnel(String),

    /// HTTP client setup or transport failure
    #[error("http error: {0}")]
    Http(String),

    /// A load request returned a non-success status under the strict policy
    #[error("request {index} failed: {detail}")]
    LoadRequest {
        /// Zero-based request index
        index: u32,
        /// Status code or transport error
        detail: String,
    },

    /// The load run finished below its success ratio
    #[error("load succeeded for {succeeded}/{sent} requests, below required ratio {required}")]
    LoadThreshold {
        succeeded: u32,
        sent: u32,
        required: f64,
    },

    /// Invalid verifier settings
    #[error("config error: {field}: {reason}")]
    Config {
        /// Setting name
        field: String,
        /// Reason
        reason: String,
    },
}

fn exit_display(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_owned(),
    }
}

impl From<VerifierError> for DeploycheckError {
    fn from(err: VerifierError) -> Self {
        match &err {
            VerifierError::Spawn { .. }
            | VerifierError::CommandFailed { .. }
            | VerifierError::CommandTimeout { .. } => {
                DeploycheckError::Scenario(ScenarioError::Command(err.to_string()))
            }
            VerifierError::Assertion { .. }
            | VerifierError::LoadRequest { .. }
            | VerifierError::LoadThreshold { .. } => {
                DeploycheckError::Scenario(ScenarioError::Assertion(err.to_string()))
            }
            VerifierError::Timeout { .. } => {
                DeploycheckError::Scenario(ScenarioError::Timeout(err.to_string()))
            }
            VerifierError::Cancelled(_) => {
                DeploycheckError::Scenario(ScenarioError::Cancelled(err.to_string()))
            }
            VerifierError::Tunnel(_) | VerifierError::Http(_) => {
                DeploycheckError::Scenario(ScenarioError::Network(err.to_string()))
            }
            VerifierError::Config { field, reason } => {
                DeploycheckError::Config(ConfigError::InvalidValue {
                    field: field.clone(),
                    reason: reason.clone(),
                })
            }
        }
    }
}

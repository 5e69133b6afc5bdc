//! deploycheck-core -- shared configuration, errors, domain types and metric
//! names for the deploycheck workspace.
//!
//! # Module Structure
//!
//! - [`config`]: `deploycheck.toml` loading, env overrides, validation
//! - [`error`]: top-level error taxonomy (`DeploycheckError`)
//! - [`types`]: releases, pod phases, scenario kinds
//! - [`metrics`]: metric name constants

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- re-exports ---

pub use config::DeploycheckConfig;
pub use error::{ConfigError, DeploycheckError, ScenarioError};
pub use types::{PodPhase, Release, ScenarioKind};

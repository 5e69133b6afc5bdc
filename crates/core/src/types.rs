//! Domain types shared across the workspace.
//!
//! Releases and workload units are owned by the external orchestrator.
//! These types only describe what deploycheck observes about them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named, deployed instance of a chart within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Release {
    /// Release name passed to `helm install`
    pub name: String,
    /// Namespace the release lives in
    pub namespace: String,
}

impl Release {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Label selector matching every workload unit of this release.
    pub fn instance_selector(&self) -> String {
        format!("app.kubernetes.io/instance={}", self.name)
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Observable phase of a workload unit (pod).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Anything the orchestrator reports that is not one of the known phases.
    /// The raw token is kept for diagnostics.
    Unknown(String),
}

impl PodPhase {
    /// Parses a phase token as printed by `kubectl`.
    ///
    /// Matching is exact: `kubectl` always prints the capitalised form.
    pub fn parse(token: &str) -> Self {
        match token {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Unknown(raw) => write!(f, "{raw}"),
        }
    }
}

/// The verification scenarios deploycheck knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// Install, wait for Running, upgrade, uninstall
    InstallUpgrade,
    /// Delete a workload unit and wait for the orchestrator to recreate it
    FailureRecovery,
    /// Sequential HTTP traffic through a port-forward tunnel
    Load,
    /// Scale the front-end deployment up and back down
    Scaling,
}

impl ScenarioKind {
    /// All scenarios, in their default execution order.
    pub const ALL: [ScenarioKind; 4] = [
        Self::InstallUpgrade,
        Self::FailureRecovery,
        Self::Load,
        Self::Scaling,
    ];

    /// Stable kebab-case name, used in release/namespace identifiers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InstallUpgrade => "install-upgrade",
            Self::FailureRecovery => "failure-recovery",
            Self::Load => "load",
            Self::Scaling => "scaling",
        }
    }

    /// One-line description for listings.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InstallUpgrade => "install the chart, wait for Running, upgrade, uninstall",
            Self::FailureRecovery => "delete a pod and wait for it to be recreated",
            Self::Load => "send sequential requests through a port-forward tunnel",
            Self::Scaling => "scale the front-end deployment up, then down",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown scenario '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

//! deploycheck verifier: drives `helm` and `kubectl` through deployment
//! lifecycle scenarios and checks the observable outcome.
//!
//! # Module Structure
//!
//! - [`error`]: Domain error type (`VerifierError`)
//! - [`command`]: External command abstraction (`CommandRunner` trait, `ProcessRunner`)
//! - [`helm`], [`kubectl`]: Invocation builders
//! - [`phase`]: Phase snapshots and expectations
//! - [`wait`]: Deadline-bounded polling with backoff
//! - [`lifecycle`]: Install / upgrade / wait / mutate / uninstall (`LifecycleVerifier`)
//! - [`tunnel`]: Scoped port-forward tunnel
//! - [`http`], [`load`]: HTTP probe and sequential load driver
//! - [`scenarios`]: The four scenarios and the suite runner
//!
//! # Architecture
//!
//! ```text
//! run_suite ──► run_scenario ──► scenario body ──► LifecycleVerifier ──► CommandRunner ──► helm/kubectl
//!                    │                 │
//!                    │                 └──► with_tunnel ──► run_load ──► HttpProbe
//!                    └──► cleanup (always)
//! ```

pub mod command;
pub mod error;
pub mod helm;
pub mod http;
pub mod kubectl;
pub mod lifecycle;
pub mod load;
pub mod phase;
pub mod scenarios;
pub mod tunnel;
pub mod wait;

// --- Public API Re-exports ---

pub use command::{BackgroundChild, CommandRunner, Invocation, InvocationResult, ProcessRunner};
pub use error::VerifierError;
pub use http::{HttpProbe, ReqwestProbe};
pub use lifecycle::{CleanupStatus, LifecycleVerifier, Mutation};
pub use load::{LoadPolicy, LoadReport};
pub use phase::{CountRule, PhaseRule, PhaseSnapshot, UnitExpectation};
pub use scenarios::{
    Outcome, ScenarioContext, ScenarioReport, ScenarioSettings, SuiteReport, run_scenario,
    run_suite,
};
pub use wait::Backoff;

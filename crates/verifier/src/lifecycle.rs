//! Lifecycle verifier: the helm/kubectl operations scenarios are built from.
//!
//! # Failure policy
//!
//! - install, upgrade and mutations: a non-zero exit is fatal and the error
//!   carries the captured stderr
//! - waits: a failing observation query is retried until the deadline; a
//!   query that cannot be spawned at all aborts the wait
//! - uninstall and namespace teardown: best effort, failures are logged and
//!   returned as [`CleanupStatus::Failed`], never as errors

use std::fmt;
use std::path::Path;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use deploycheck_core::config::DeploycheckConfig;
use deploycheck_core::metrics::CLEANUP_FAILURES_TOTAL;
use deploycheck_core::types::Release;

use crate::command::{CommandRunner, Invocation, InvocationResult};
use crate::error::VerifierError;
use crate::helm::Helm;
use crate::kubectl::Kubectl;
use crate::phase::{PhaseSnapshot, UnitExpectation, parse_names};
use crate::wait::{Backoff, Probe, poll_until};

/// A change applied to a running release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    ScaleUp { deployment: String, replicas: u32 },
    ScaleDown { deployment: String, replicas: u32 },
    DeleteUnit { name: String },
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScaleUp {
                deployment,
                replicas,
            } => write!(f, "scale up {deployment} to {replicas}"),
            Self::ScaleDown {
                deployment,
                replicas,
            } => write!(f, "scale down {deployment} to {replicas}"),
            Self::DeleteUnit { name } => write!(f, "delete pod {name}"),
        }
    }
}

/// Result of a best-effort cleanup command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStatus {
    Done,
    Failed(String),
}

/// Drives helm and kubectl through a [`CommandRunner`].
pub struct LifecycleVerifier<R: CommandRunner> {
    runner: R,
    helm: Helm,
    kubectl: Kubectl,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl<R: CommandRunner> LifecycleVerifier<R> {
    pub fn new(runner: R, helm: Helm, kubectl: Kubectl, backoff: Backoff) -> Self {
        Self {
            runner,
            helm,
            kubectl,
            backoff,
            cancel: CancellationToken::new(),
        }
    }

    /// Builds a verifier from the cluster and wait sections of `config`.
    pub fn from_config(runner: R, config: &DeploycheckConfig) -> Self {
        Self::new(
            runner,
            Helm::from_config(&config.cluster),
            Kubectl::from_config(&config.cluster),
            Backoff::from_config(&config.wait),
        )
    }

    /// Waits observe `cancel` and stop with [`VerifierError::Cancelled`].
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn kubectl(&self) -> &Kubectl {
        &self.kubectl
    }

    /// Default polling policy for waits.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn install(
        &self,
        release: &Release,
        chart: &Path,
        values: &Path,
    ) -> Result<InvocationResult, VerifierError> {
        info!(release = %release, chart = %chart.display(), "installing chart");
        self.run_checked(self.helm.install(release, chart, values))
            .await
    }

    /// Re-applies the chart to an existing release.
    pub async fn upgrade(
        &self,
        release: &Release,
        chart: &Path,
        values: &Path,
    ) -> Result<InvocationResult, VerifierError> {
        info!(release = %release, chart = %chart.display(), "upgrading release");
        self.run_checked(self.helm.upgrade(release, chart, values))
            .await
    }

    /// Polls the phase query until `expectation` holds.
    ///
    /// Returns the snapshot that satisfied it. On timeout the error carries
    /// the last observed phases (or the last query failure).
    pub async fn await_observable_phase(
        &self,
        namespace: &str,
        selector: Option<&str>,
        expectation: &UnitExpectation,
        backoff: &Backoff,
    ) -> Result<PhaseSnapshot, VerifierError> {
        let invocation = self.kubectl.pod_phases(namespace, selector);
        let what = format!("{expectation} in {namespace}");
        let runner = &self.runner;

        let snapshot = poll_until(&what, backoff, &self.cancel, || {
            let invocation = invocation.clone();
            async move {
                match runner.run(&invocation).await {
                    Ok(result) if result.success() => {
                        let snapshot = PhaseSnapshot::parse(&result.stdout);
                        if expectation.is_met(&snapshot) {
                            Ok(Probe::Ready(snapshot))
                        } else {
                            Ok(Probe::NotYet(snapshot.to_string()))
                        }
                    }
                    Ok(result) => {
                        warn!(command = %invocation, stderr = %result.stderr.trim(), "phase query failed, retrying");
                        Ok(Probe::NotYet(format!(
                            "query failed: {}",
                            result.stderr.trim()
                        )))
                    }
                    Err(VerifierError::CommandTimeout { command, .. }) => {
                        Ok(Probe::NotYet(format!("query timed out: {command}")))
                    }
                    Err(e) => Err(e),
                }
            }
        })
        .await?;

        info!(namespace, expectation = %expectation, observed = %snapshot, "state observed");
        Ok(snapshot)
    }

    /// Polls until the pod count satisfies `expectation`.
    ///
    /// Same as [`await_observable_phase`](Self::await_observable_phase); kept
    /// separate so call sites read as what they check.
    pub async fn await_unit_count(
        &self,
        namespace: &str,
        selector: Option<&str>,
        expectation: &UnitExpectation,
        backoff: &Backoff,
    ) -> Result<usize, VerifierError> {
        self.await_observable_phase(namespace, selector, expectation, backoff)
            .await
            .map(|snapshot| snapshot.len())
    }

    pub async fn mutate(
        &self,
        namespace: &str,
        mutation: &Mutation,
    ) -> Result<InvocationResult, VerifierError> {
        info!(namespace, mutation = %mutation, "applying mutation");
        let invocation = match mutation {
            Mutation::ScaleUp {
                deployment,
                replicas,
            }
            | Mutation::ScaleDown {
                deployment,
                replicas,
            } => self
                .kubectl
                .scale_deployment(namespace, deployment, *replicas),
            Mutation::DeleteUnit { name } => self.kubectl.delete_pod(namespace, name),
        };
        self.run_checked(invocation).await
    }

    /// Name of the first pod matching `selector`.
    ///
    /// An empty result is an assertion failure, not a retry.
    pub async fn first_unit_name(
        &self,
        namespace: &str,
        selector: Option<&str>,
    ) -> Result<String, VerifierError> {
        let result = self
            .run_checked(self.kubectl.pod_names(namespace, selector))
            .await?;
        parse_names(&result.stdout)
            .into_iter()
            .next()
            .ok_or_else(|| VerifierError::Assertion {
                step: "find pod".to_owned(),
                detail: format!(
                    "no pod matches {} in {namespace}",
                    selector.unwrap_or("<all>")
                ),
            })
    }

    /// Removes the release. Best effort.
    pub async fn uninstall(&self, release: &Release) -> CleanupStatus {
        info!(release = %release, "uninstalling release");
        self.best_effort("uninstall", self.helm.uninstall(release))
            .await
    }

    /// Creates the namespace. An already existing namespace counts as done.
    pub async fn ensure_namespace(&self, namespace: &str) -> CleanupStatus {
        let invocation = self.kubectl.create_namespace(namespace);
        match self.runner.run(&invocation).await {
            Ok(result) if result.success() => CleanupStatus::Done,
            Ok(result) if result.stderr.contains("AlreadyExists") => CleanupStatus::Done,
            Ok(result) => {
                let msg = format!("'{invocation}' failed: {}", result.stderr.trim());
                warn!(namespace, error = %msg, "namespace creation failed");
                CleanupStatus::Failed(msg)
            }
            Err(e) => {
                warn!(namespace, error = %e, "namespace creation failed");
                CleanupStatus::Failed(e.to_string())
            }
        }
    }

    /// Deletes the namespace. Best effort.
    pub async fn delete_namespace(&self, namespace: &str) -> CleanupStatus {
        self.best_effort("delete namespace", self.kubectl.delete_namespace(namespace))
            .await
    }

    async fn run_checked(&self, invocation: Invocation) -> Result<InvocationResult, VerifierError> {
        self.runner.run(&invocation).await?.check(&invocation)
    }

    async fn best_effort(&self, step: &str, invocation: Invocation) -> CleanupStatus {
        match self.run_checked(invocation).await {
            Ok(_) => CleanupStatus::Done,
            Err(e) => {
                counter!(CLEANUP_FAILURES_TOTAL).increment(1);
                warn!(step, error = %e, "cleanup step failed, continuing");
                CleanupStatus::Failed(e.to_string())
            }
        }
    }
}

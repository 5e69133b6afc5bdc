//! Verification scenarios.
//!
//! Each scenario installs the chart into its own release and namespace,
//! exercises it, and then always cleans up: uninstall the release (unless
//! the scenario already removed it), then delete the namespace.
//!
//! ```text
//!   ScenarioContext::new ──► ensure namespace ──► body ──► cleanup ──► ScenarioReport
//!                                                  │           ▲
//!                                                  └── error ──┘
//! ```
//!
//! Scenarios run sequentially; [`run_suite`] stops at the first failure
//! unless asked to keep going.

mod failure_recovery;
mod install_upgrade;
mod scaling;

use std::future::Future;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{error, info, warn};

use deploycheck_core::config::{ChartConfig, DeploycheckConfig, LoadConfig, ScalingConfig};
use deploycheck_core::metrics::{
    LABEL_RESULT, LABEL_SCENARIO, SCENARIO_DURATION_SECONDS, SCENARIOS_TOTAL,
};
use deploycheck_core::types::{Release, ScenarioKind};

use crate::command::CommandRunner;
use crate::error::VerifierError;
use crate::http::HttpProbe;
use crate::lifecycle::{CleanupStatus, LifecycleVerifier};
use crate::load::LoadReport;
use crate::wait::Backoff;

/// Helm release names are limited to 53 characters.
const MAX_RELEASE_NAME_LEN: usize = 53;
/// Namespace names are DNS labels.
const MAX_NAMESPACE_LEN: usize = 63;

/// Everything a scenario body needs besides the verifier.
#[derive(Debug, Clone)]
pub struct ScenarioSettings {
    pub chart: ChartConfig,
    pub load: LoadConfig,
    pub scaling: ScalingConfig,
    /// Polling schedule for tunnel readiness
    pub tunnel_ready: Backoff,
}

impl ScenarioSettings {
    pub fn from_config(config: &DeploycheckConfig) -> Self {
        Self {
            chart: config.chart.clone(),
            load: config.load.clone(),
            scaling: config.scaling.clone(),
            tunnel_ready: Backoff::from_config(&config.wait).with_timeout(
                std::time::Duration::from_secs(config.load.tunnel_ready_timeout_secs),
            ),
        }
    }
}

/// Identifiers owned by one scenario run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioContext {
    pub kind: ScenarioKind,
    pub release: Release,
    /// Label selector matching the release's pods
    pub selector: String,
    /// Front-end Deployment and Service name
    pub frontend: String,
}

impl ScenarioContext {
    /// Derives release and namespace names from the configured prefixes.
    ///
    /// With `unique_names` the names get an 8-hex-digit random suffix, so
    /// repeated or concurrent runs never collide.
    pub fn new(kind: ScenarioKind, chart: &ChartConfig) -> Result<Self, VerifierError> {
        let suffix = chart
            .unique_names
            .then(|| uuid::Uuid::new_v4().simple().to_string()[..8].to_owned());
        let name = |prefix: &str| match &suffix {
            Some(suffix) => format!("{prefix}-{kind}-{suffix}"),
            None => format!("{prefix}-{kind}"),
        };

        let release_name = name(&chart.release_prefix);
        let namespace = name(&chart.namespace_prefix);
        check_dns_label("chart.release_prefix", &release_name, MAX_RELEASE_NAME_LEN)?;
        check_dns_label("chart.namespace_prefix", &namespace, MAX_NAMESPACE_LEN)?;

        let release = Release::new(release_name, namespace);
        Ok(Self {
            kind,
            selector: release.instance_selector(),
            frontend: format!("{}{}", release.name, chart.frontend_suffix),
            release,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.release.namespace
    }

    pub fn selector(&self) -> Option<&str> {
        Some(&self.selector)
    }
}

fn check_dns_label(field: &str, name: &str, max_len: usize) -> Result<(), VerifierError> {
    let invalid = |reason: String| VerifierError::Config {
        field: field.to_owned(),
        reason,
    };
    if name.len() > max_len {
        return Err(invalid(format!(
            "generated name '{name}' is longer than {max_len} characters"
        )));
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_ends = name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name.ends_with(|c: char| c.is_ascii_alphanumeric());
    if !valid_chars || !valid_ends {
        return Err(invalid(format!(
            "generated name '{name}' must be lowercase alphanumerics and '-'"
        )));
    }
    Ok(())
}

/// One step taken by a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub ok: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Ordered record of scenario steps.
#[derive(Debug, Default)]
pub struct StepLog {
    records: Vec<StepRecord>,
}

impl StepLog {
    /// Awaits `step` and records its outcome. The error is passed through.
    pub async fn record<T, Fut>(&mut self, name: &str, step: Fut) -> Result<T, VerifierError>
    where
        Fut: Future<Output = Result<T, VerifierError>>,
    {
        let started = Instant::now();
        let result = step.await;
        self.push(name, started, result.as_ref().err().map(ToString::to_string));
        result
    }

    /// Awaits a best-effort step. Failure is recorded, not raised.
    pub async fn record_cleanup<Fut>(&mut self, name: &str, step: Fut) -> CleanupStatus
    where
        Fut: Future<Output = CleanupStatus>,
    {
        let started = Instant::now();
        let status = step.await;
        let detail = match &status {
            CleanupStatus::Done => None,
            CleanupStatus::Failed(msg) => Some(msg.clone()),
        };
        self.push(name, started, detail);
        status
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    fn push(&mut self, name: &str, started: Instant, failure: Option<String>) {
        self.records.push(StepRecord {
            name: name.to_owned(),
            ok: failure.is_none(),
            elapsed_ms: elapsed_ms(started),
            detail: failure,
        });
    }
}

/// What a scenario body hands back on success.
#[derive(Debug, Default)]
pub(crate) struct ScenarioOutput {
    pub load: Option<LoadReport>,
    /// The body already uninstalled the release
    pub release_removed: bool,
}

/// Final verdict of one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed { error: String },
}

/// Full record of one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub scenario: ScenarioKind,
    pub release: String,
    pub namespace: String,
    pub outcome: Outcome,
    pub steps: Vec<StepRecord>,
    pub cleanup_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadReport>,
    pub elapsed_ms: u64,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }
}

/// Runs one scenario end to end. Never fails: errors end up in the report.
pub async fn run_scenario<R, P>(
    kind: ScenarioKind,
    verifier: &LifecycleVerifier<R>,
    settings: &ScenarioSettings,
    probe: &P,
) -> ScenarioReport
where
    R: CommandRunner,
    P: HttpProbe,
{
    let started = Instant::now();
    let ctx = match ScenarioContext::new(kind, &settings.chart) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(scenario = %kind, error = %e, "scenario rejected before start");
            let report = ScenarioReport {
                scenario: kind,
                release: String::new(),
                namespace: String::new(),
                outcome: Outcome::Failed {
                    error: e.to_string(),
                },
                steps: Vec::new(),
                cleanup_errors: Vec::new(),
                load: None,
                elapsed_ms: elapsed_ms(started),
            };
            record_scenario(&report, started);
            return report;
        }
    };

    info!(
        scenario = %kind,
        release = %ctx.release.name,
        namespace = %ctx.release.namespace,
        "scenario started"
    );

    let mut steps = StepLog::default();
    if settings.chart.manage_namespace {
        steps
            .record_cleanup("create namespace", verifier.ensure_namespace(ctx.namespace()))
            .await;
    }

    let body = match kind {
        ScenarioKind::InstallUpgrade => {
            install_upgrade::run(verifier, settings, &ctx, &mut steps).await
        }
        ScenarioKind::FailureRecovery => {
            failure_recovery::run(verifier, settings, &ctx, &mut steps).await
        }
        ScenarioKind::Load => load_test::run(verifier, settings, &ctx, &mut steps, probe).await,
        ScenarioKind::Scaling => scaling::run(verifier, settings, &ctx, &mut steps).await,
    };

    let release_removed = body.as_ref().is_ok_and(|out| out.release_removed);
    let cleanup_errors = cleanup(verifier, settings, &ctx, &mut steps, release_removed).await;

    let (outcome, load) = match body {
        Ok(output) => (Outcome::Passed, output.load),
        Err(e) => (
            Outcome::Failed {
                error: e.to_string(),
            },
            None,
        ),
    };

    let report = ScenarioReport {
        scenario: kind,
        release: ctx.release.name.clone(),
        namespace: ctx.release.namespace.clone(),
        outcome,
        steps: steps.records,
        cleanup_errors,
        load,
        elapsed_ms: elapsed_ms(started),
    };

    match &report.outcome {
        Outcome::Passed => info!(
            scenario = %kind,
            elapsed_ms = report.elapsed_ms,
            "scenario passed"
        ),
        Outcome::Failed { error } => error!(
            scenario = %kind,
            release = %report.release,
            elapsed_ms = report.elapsed_ms,
            error = %error,
            "scenario failed"
        ),
    }
    record_scenario(&report, started);
    report
}

/// Uninstall then namespace delete. Returns the failures, which never
/// affect the outcome.
async fn cleanup<R: CommandRunner>(
    verifier: &LifecycleVerifier<R>,
    settings: &ScenarioSettings,
    ctx: &ScenarioContext,
    steps: &mut StepLog,
    release_removed: bool,
) -> Vec<String> {
    let mut errors = Vec::new();

    if !release_removed {
        if let CleanupStatus::Failed(msg) = steps
            .record_cleanup("cleanup: uninstall", verifier.uninstall(&ctx.release))
            .await
        {
            errors.push(msg);
        }
    }

    if settings.chart.manage_namespace {
        if let CleanupStatus::Failed(msg) = steps
            .record_cleanup(
                "cleanup: delete namespace",
                verifier.delete_namespace(ctx.namespace()),
            )
            .await
        {
            errors.push(msg);
        }
    }

    if !errors.is_empty() {
        warn!(
            scenario = %ctx.kind,
            failures = errors.len(),
            "cleanup incomplete; resources may need manual removal"
        );
    }
    errors
}

fn record_scenario(report: &ScenarioReport, started: Instant) {
    let result = if report.passed() { "passed" } else { "failed" };
    counter!(
        SCENARIOS_TOTAL,
        LABEL_SCENARIO => report.scenario.as_str(),
        LABEL_RESULT => result
    )
    .increment(1);
    histogram!(SCENARIO_DURATION_SECONDS, LABEL_SCENARIO => report.scenario.as_str())
        .record(started.elapsed().as_secs_f64());
}

/// Results of a suite run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuiteReport {
    pub scenarios: Vec<ScenarioReport>,
    /// Scenarios not run because an earlier one failed or the run was
    /// cancelled
    pub skipped: Vec<ScenarioKind>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.skipped.is_empty() && self.scenarios.iter().all(ScenarioReport::passed)
    }

    pub fn failed_count(&self) -> usize {
        self.scenarios.iter().filter(|r| !r.passed()).count()
    }
}

/// Runs `kinds` in order.
///
/// Stops after the first failed scenario unless `keep_going` is set, and
/// after cancellation regardless.
pub async fn run_suite<R, P>(
    kinds: &[ScenarioKind],
    verifier: &LifecycleVerifier<R>,
    settings: &ScenarioSettings,
    probe: &P,
    keep_going: bool,
) -> SuiteReport
where
    R: CommandRunner,
    P: HttpProbe,
{
    let mut suite = SuiteReport::default();

    for (i, kind) in kinds.iter().enumerate() {
        let report = run_scenario(*kind, verifier, settings, probe).await;
        let failed = !report.passed();
        suite.scenarios.push(report);

        let cancelled = verifier.cancel_token().is_cancelled();
        if cancelled || (failed && !keep_going) {
            suite.skipped = kinds[i + 1..].to_vec();
            if !suite.skipped.is_empty() {
                warn!(
                    skipped = suite.skipped.len(),
                    cancelled, "stopping suite early"
                );
            }
            break;
        }
    }

    suite
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart(unique: bool) -> ChartConfig {
        ChartConfig {
            unique_names: unique,
            ..ChartConfig::default()
        }
    }

    #[test]
    fn fixed_names_follow_prefixes() {
        let ctx = ScenarioContext::new(ScenarioKind::Scaling, &chart(false)).unwrap();
        assert_eq!(ctx.release.name, "test-release-scaling");
        assert_eq!(ctx.release.namespace, "test-namespace-scaling");
        assert_eq!(ctx.frontend, "test-release-scaling-frontend");
        assert_eq!(ctx.selector, "app.kubernetes.io/instance=test-release-scaling");
    }

    #[test]
    fn unique_names_share_one_suffix() {
        let ctx = ScenarioContext::new(ScenarioKind::Load, &chart(true)).unwrap();
        let release_suffix = ctx.release.name.rsplit('-').next().unwrap();
        let ns_suffix = ctx.release.namespace.rsplit('-').next().unwrap();
        assert_eq!(release_suffix.len(), 8);
        assert!(release_suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(release_suffix, ns_suffix);
    }

    #[test]
    fn unique_names_differ_between_runs() {
        let a = ScenarioContext::new(ScenarioKind::Load, &chart(true)).unwrap();
        let b = ScenarioContext::new(ScenarioKind::Load, &chart(true)).unwrap();
        assert_ne!(a.release.name, b.release.name);
    }

    #[test]
    fn overlong_release_name_is_rejected() {
        let mut chart = chart(true);
        chart.release_prefix = "a".repeat(40);
        let err = ScenarioContext::new(ScenarioKind::FailureRecovery, &chart).unwrap_err();
        assert!(matches!(err, VerifierError::Config { ref field, .. } if field == "chart.release_prefix"));
    }

    #[test]
    fn uppercase_prefix_is_rejected() {
        let mut chart = chart(false);
        chart.namespace_prefix = "Test".to_owned();
        assert!(ScenarioContext::new(ScenarioKind::Load, &chart).is_err());
    }

    #[tokio::test]
    async fn step_log_records_success_and_failure() {
        let mut steps = StepLog::default();
        steps.record("ok", async { Ok::<_, VerifierError>(1) }).await.unwrap();
        let _ = steps
            .record("bad", async {
                Err::<(), _>(VerifierError::Tunnel("down".to_owned()))
            })
            .await;
        steps
            .record_cleanup("cleanup", async { CleanupStatus::Failed("gone".to_owned()) })
            .await;

        let records = steps.records();
        assert_eq!(records.len(), 3);
        assert!(records[0].ok);
        assert!(!records[1].ok);
        assert_eq!(records[1].detail.as_deref(), Some("tunnel error: down"));
        assert_eq!(records[2].detail.as_deref(), Some("gone"));
    }

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_value(Outcome::Failed {
            error: "x".to_owned(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "status": "failed", "error": "x" }));
    }

    #[test]
    fn settings_use_tunnel_deadline() {
        let settings = ScenarioSettings::from_config(&DeploycheckConfig::default());
        assert_eq!(settings.tunnel_ready.timeout, std::time::Duration::from_secs(15));
    }
}

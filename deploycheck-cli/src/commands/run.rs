//! `deploycheck run` command handler

use std::future::Future;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use deploycheck_core::config::{ChartConfig, DeploycheckConfig};
use deploycheck_core::error::{ConfigError, DeploycheckError};
use deploycheck_core::metrics as m;
use deploycheck_core::types::ScenarioKind;
use deploycheck_verifier::{
    LifecycleVerifier, Outcome, ProcessRunner, ReqwestProbe, ScenarioSettings, SuiteReport,
    run_suite,
};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `run` command.
///
/// # Errors
///
/// * `CliError::Config` if the configuration or chart inputs are unusable
/// * `CliError::ScenarioFailed` if any scenario failed or was skipped
pub async fn execute(
    args: RunArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let mut config = load_config(config_path).await?;
    apply_overrides(&mut config, &args);
    config.validate()?;
    check_chart_inputs(&config.chart).await?;

    let kinds = selected_kinds(&args.scenarios);
    info!(
        scenarios = kinds.len(),
        chart = %config.chart.chart_path.display(),
        keep_going = args.keep_going,
        "starting verification run"
    );

    m::describe_all();

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if watch_interrupts(token, tokio::signal::ctrl_c).await {
            std::process::exit(130);
        }
    });

    let runner = ProcessRunner::new(config.cluster.command_timeout());
    let verifier = LifecycleVerifier::from_config(runner, &config).with_cancellation(cancel);
    let probe = ReqwestProbe::new(std::time::Duration::from_secs(
        config.load.request_timeout_secs,
    ))?;
    let settings = ScenarioSettings::from_config(&config);

    let suite = run_suite(&kinds, &verifier, &settings, &probe, args.keep_going).await;
    interrupt.abort();

    let report = RunReport(suite);
    writer.render(&report)?;

    if report.0.passed() {
        Ok(())
    } else {
        Err(CliError::ScenarioFailed(report.summary()))
    }
}

/// Loads the configuration file, falling back to defaults (plus environment
/// overrides) when it does not exist.
async fn load_config(config_path: &Path) -> Result<DeploycheckConfig, CliError> {
    match DeploycheckConfig::load(config_path).await {
        Ok(config) => Ok(config),
        Err(DeploycheckError::Config(ConfigError::FileNotFound { path })) => {
            warn!(path = %path, "config file not found, using defaults");
            let mut config = DeploycheckConfig::default();
            config.apply_env_overrides();
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}

/// Applies command-line flags on top of file and environment settings.
fn apply_overrides(config: &mut DeploycheckConfig, args: &RunArgs) {
    if let Some(chart) = &args.chart {
        config.chart.chart_path = chart.clone();
    }
    if let Some(values) = &args.values {
        config.chart.values_file = values.clone();
    }
    if let Some(context) = &args.kube_context {
        config.cluster.kube_context = context.clone();
    }
    if let Some(prefix) = &args.release_prefix {
        config.chart.release_prefix = prefix.clone();
    }
    if let Some(prefix) = &args.namespace_prefix {
        config.chart.namespace_prefix = prefix.clone();
    }
    if args.fixed_names {
        config.chart.unique_names = false;
    }
    if let Some(secs) = args.wait_timeout {
        config.wait.timeout_secs = secs;
    }
    if let Some(requests) = args.requests {
        config.load.requests = requests;
    }
}

/// The chart directory and values file must exist before anything touches
/// the cluster.
async fn check_chart_inputs(chart: &ChartConfig) -> Result<(), CliError> {
    let chart_is_dir = tokio::fs::metadata(&chart.chart_path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false);
    if !chart_is_dir {
        return Err(CliError::Config(format!(
            "chart directory not found: {}",
            chart.chart_path.display()
        )));
    }

    let values_is_file = tokio::fs::metadata(&chart.values_file)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false);
    if !values_is_file {
        return Err(CliError::Config(format!(
            "values file not found: {}",
            chart.values_file.display()
        )));
    }

    Ok(())
}

/// Requested scenarios in command-line order, duplicates dropped. Empty
/// means all of them.
fn selected_kinds(requested: &[ScenarioKind]) -> Vec<ScenarioKind> {
    if requested.is_empty() {
        return ScenarioKind::ALL.to_vec();
    }
    let mut kinds = Vec::with_capacity(requested.len());
    for kind in requested {
        if !kinds.contains(kind) {
            kinds.push(*kind);
        }
    }
    kinds
}

/// The first interrupt cancels the run and lets cleanup finish. Returns true
/// when a second interrupt arrives, meaning the caller should abort now.
async fn watch_interrupts<F, Fut>(cancel: CancellationToken, mut interrupt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = interrupt().await {
        warn!(error = %e, "cannot listen for interrupts");
        return false;
    }
    warn!("interrupt received, cleaning up; press Ctrl-C again to abort");
    cancel.cancel();

    if interrupt().await.is_err() {
        return false;
    }
    error!("second interrupt received, aborting without cleanup");
    true
}

/// Suite results as rendered by `deploycheck run`.
#[derive(Serialize)]
#[serde(transparent)]
pub struct RunReport(pub SuiteReport);

impl RunReport {
    fn summary(&self) -> String {
        let total = self.0.scenarios.len();
        let failed = self.0.failed_count();
        let mut summary = format!("{} passed, {failed} failed", total - failed);
        if !self.0.skipped.is_empty() {
            summary.push_str(&format!(", {} skipped", self.0.skipped.len()));
        }
        summary
    }
}

fn secs(ms: u64) -> String {
    format!("{:.1}s", std::time::Duration::from_millis(ms).as_secs_f64())
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for report in &self.0.scenarios {
            let verdict = match &report.outcome {
                Outcome::Passed => "PASSED".green().bold(),
                Outcome::Failed { .. } => "FAILED".red().bold(),
            };
            writeln!(
                w,
                "{} {} ({})",
                report.scenario.as_str().bold(),
                verdict,
                secs(report.elapsed_ms)
            )?;
            writeln!(
                w,
                "  release: {}  namespace: {}",
                report.release, report.namespace
            )?;

            for step in &report.steps {
                let mark = if step.ok { "✓".green() } else { "✗".red() };
                write!(w, "  {mark} {} ({})", step.name, secs(step.elapsed_ms))?;
                match &step.detail {
                    Some(detail) if !step.ok => writeln!(w, ": {}", detail.red())?,
                    _ => writeln!(w)?,
                }
            }

            if let Some(load) = &report.load {
                writeln!(
                    w,
                    "  load: {}/{} succeeded ({:.0}%) in {}",
                    load.succeeded,
                    load.sent,
                    load.success_ratio() * 100.0,
                    secs(load.elapsed_ms)
                )?;
            }

            if let Outcome::Failed { error } = &report.outcome {
                writeln!(w, "  error: {}", error.red())?;
            }

            for cleanup in &report.cleanup_errors {
                writeln!(w, "  {} {cleanup}", "cleanup warning:".yellow())?;
            }
            writeln!(w)?;
        }

        for kind in &self.0.skipped {
            writeln!(w, "{} {}", kind.as_str().bold(), "SKIPPED".yellow())?;
        }

        let summary = self.summary();
        if self.0.passed() {
            writeln!(w, "Summary: {}", summary.green())?;
        } else {
            writeln!(w, "Summary: {}", summary.red())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use deploycheck_verifier::ScenarioReport;
    use deploycheck_verifier::load::{LoadFailure, LoadReport};
    use deploycheck_verifier::scenarios::StepRecord;

    fn step(name: &str, ok: bool, detail: Option<&str>) -> StepRecord {
        StepRecord {
            name: name.to_owned(),
            ok,
            elapsed_ms: 1_500,
            detail: detail.map(str::to_owned),
        }
    }

    fn report(kind: ScenarioKind, outcome: Outcome) -> ScenarioReport {
        ScenarioReport {
            scenario: kind,
            release: format!("test-release-{}", kind.as_str()),
            namespace: format!("test-namespace-{}", kind.as_str()),
            outcome,
            steps: vec![step("install", true, None)],
            cleanup_errors: Vec::new(),
            load: None,
            elapsed_ms: 12_000,
        }
    }

    fn render(report: &RunReport) -> String {
        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");
        String::from_utf8(buffer).expect("valid UTF-8")
    }

    #[test]
    fn selected_kinds_defaults_to_all_in_order() {
        assert_eq!(selected_kinds(&[]), ScenarioKind::ALL.to_vec());
    }

    #[test]
    fn selected_kinds_keeps_order_and_drops_duplicates() {
        let kinds = selected_kinds(&[
            ScenarioKind::Scaling,
            ScenarioKind::Load,
            ScenarioKind::Scaling,
        ]);
        assert_eq!(kinds, vec![ScenarioKind::Scaling, ScenarioKind::Load]);
    }

    #[test]
    fn overrides_replace_file_settings() {
        let mut config = DeploycheckConfig::default();
        let args = RunArgs {
            chart: Some(PathBuf::from("/charts/pipeline")),
            values: Some(PathBuf::from("/charts/values.yaml")),
            kube_context: Some("kind-ci".to_owned()),
            release_prefix: Some("ci".to_owned()),
            namespace_prefix: Some("ci-ns".to_owned()),
            fixed_names: true,
            wait_timeout: Some(30),
            requests: Some(5),
            ..RunArgs::default()
        };

        apply_overrides(&mut config, &args);

        assert_eq!(config.chart.chart_path, PathBuf::from("/charts/pipeline"));
        assert_eq!(config.chart.values_file, PathBuf::from("/charts/values.yaml"));
        assert_eq!(config.cluster.context(), Some("kind-ci"));
        assert_eq!(config.chart.release_prefix, "ci");
        assert_eq!(config.chart.namespace_prefix, "ci-ns");
        assert!(!config.chart.unique_names);
        assert_eq!(config.wait.timeout_secs, 30);
        assert_eq!(config.load.requests, 5);
    }

    #[test]
    fn no_overrides_leave_config_untouched() {
        let mut config = DeploycheckConfig::default();
        apply_overrides(&mut config, &RunArgs::default());
        assert!(config.chart.unique_names);
        assert_eq!(config.load.requests, 50);
        assert_eq!(config.cluster.context(), None);
    }

    #[tokio::test]
    async fn chart_inputs_must_exist() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let chart_dir = dir.path().join("chart");
        let values = dir.path().join("values.yaml");

        let mut chart = ChartConfig {
            chart_path: chart_dir.clone(),
            values_file: values.clone(),
            ..ChartConfig::default()
        };

        let err = check_chart_inputs(&chart).await.expect_err("chart missing");
        assert!(err.to_string().contains("chart directory not found"));
        assert_eq!(err.exit_code(), 2);

        std::fs::create_dir(&chart_dir).expect("create chart dir");
        let err = check_chart_inputs(&chart).await.expect_err("values missing");
        assert!(err.to_string().contains("values file not found"));

        std::fs::write(&values, "replicaCount: 1\n").expect("write values");
        check_chart_inputs(&chart).await.expect("both inputs exist");

        chart.chart_path = values;
        assert!(
            check_chart_inputs(&chart).await.is_err(),
            "a file is not a chart directory"
        );
    }

    #[tokio::test]
    async fn missing_config_file_falls_back_to_defaults() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let config = load_config(&dir.path().join("absent.toml"))
            .await
            .expect("defaults");
        assert_eq!(config.chart.release_prefix, "test-release");
    }

    #[tokio::test]
    async fn invalid_config_file_is_a_config_error() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("deploycheck.toml");
        std::fs::write(&path, "[wait]\ntimeout_secs = 0\n").expect("write config");

        let err = load_config(&path).await.expect_err("zero timeout");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn render_passed_suite() {
        let mut passed = report(ScenarioKind::Load, Outcome::Passed);
        passed.load = Some(LoadReport {
            sent: 50,
            succeeded: 50,
            failures: Vec::new(),
            elapsed_ms: 2_000,
        });
        let run = RunReport(SuiteReport {
            scenarios: vec![passed],
            skipped: Vec::new(),
        });

        let text = render(&run);
        assert!(text.contains("load"));
        assert!(text.contains("PASSED"));
        assert!(text.contains("release: test-release-load"));
        assert!(text.contains("install (1.5s)"));
        assert!(text.contains("load: 50/50 succeeded (100%) in 2.0s"));
        assert!(text.contains("1 passed, 0 failed"));
    }

    #[test]
    fn render_failed_suite_shows_error_cleanup_and_skipped() {
        let mut failed = report(
            ScenarioKind::InstallUpgrade,
            Outcome::Failed {
                error: "timed out waiting for all pods Running".to_owned(),
            },
        );
        failed
            .steps
            .push(step("await running", false, Some("last observed: Pending")));
        failed
            .cleanup_errors
            .push("uninstall: release not found".to_owned());
        failed.load = Some(LoadReport {
            sent: 2,
            succeeded: 1,
            failures: vec![LoadFailure {
                index: 2,
                detail: "status 500".to_owned(),
            }],
            elapsed_ms: 100,
        });

        let run = RunReport(SuiteReport {
            scenarios: vec![failed],
            skipped: vec![ScenarioKind::FailureRecovery, ScenarioKind::Scaling],
        });

        let text = render(&run);
        assert!(text.contains("FAILED"));
        assert!(text.contains("await running (1.5s)"));
        assert!(text.contains("last observed: Pending"));
        assert!(text.contains("error:"));
        assert!(text.contains("timed out waiting for all pods Running"));
        assert!(text.contains("cleanup warning:"));
        assert!(text.contains("uninstall: release not found"));
        assert!(text.contains("failure-recovery"));
        assert!(text.contains("SKIPPED"));
        assert_eq!(run.summary(), "0 passed, 1 failed, 2 skipped");
    }

    #[test]
    fn json_report_is_the_suite_itself() {
        let run = RunReport(SuiteReport {
            scenarios: vec![report(ScenarioKind::Scaling, Outcome::Passed)],
            skipped: vec![ScenarioKind::Load],
        });
        let json = serde_json::to_value(&run).expect("serialize");
        assert_eq!(json["scenarios"][0]["scenario"], "scaling");
        assert_eq!(json["scenarios"][0]["outcome"]["status"], "passed");
        assert_eq!(json["skipped"][0], "load");
    }

    #[tokio::test]
    async fn second_interrupt_requests_abort() {
        let cancel = CancellationToken::new();
        let mut calls = 0;
        let abort = watch_interrupts(cancel.clone(), || {
            calls += 1;
            std::future::ready(Ok(()))
        })
        .await;
        assert!(abort);
        assert!(cancel.is_cancelled());
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn first_interrupt_only_cancels() {
        let cancel = CancellationToken::new();
        let mut calls = 0;
        let abort = watch_interrupts(cancel.clone(), || {
            calls += 1;
            let result = if calls == 1 {
                Ok(())
            } else {
                Err(std::io::Error::other("listener closed"))
            };
            std::future::ready(result)
        })
        .await;
        assert!(!abort);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn broken_signal_listener_leaves_run_alone() {
        let cancel = CancellationToken::new();
        let abort = watch_interrupts(cancel.clone(), || {
            std::future::ready(Err(std::io::Error::other("no signal handler")))
        })
        .await;
        assert!(!abort);
        assert!(!cancel.is_cancelled());
    }
}

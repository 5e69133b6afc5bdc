//! Install, wait for Running, upgrade, uninstall.

use crate::command::CommandRunner;
use crate::error::VerifierError;
use crate::lifecycle::{CleanupStatus, LifecycleVerifier};
use crate::phase::UnitExpectation;

use super::{ScenarioContext, ScenarioOutput, ScenarioSettings, StepLog};

pub(super) async fn run<R: CommandRunner>(
    verifier: &LifecycleVerifier<R>,
    settings: &ScenarioSettings,
    ctx: &ScenarioContext,
    steps: &mut StepLog,
) -> Result<ScenarioOutput, VerifierError> {
    let chart = &settings.chart;

    steps
        .record(
            "install",
            verifier.install(&ctx.release, &chart.chart_path, &chart.values_file),
        )
        .await?;
    steps
        .record(
            "await running",
            verifier.await_observable_phase(
                ctx.namespace(),
                ctx.selector(),
                &UnitExpectation::all_running(),
                verifier.backoff(),
            ),
        )
        .await?;
    steps
        .record(
            "upgrade",
            verifier.upgrade(&ctx.release, &chart.chart_path, &chart.values_file),
        )
        .await?;

    let status = steps
        .record_cleanup("uninstall", verifier.uninstall(&ctx.release))
        .await;

    Ok(ScenarioOutput {
        load: None,
        release_removed: status == CleanupStatus::Done,
    })
}

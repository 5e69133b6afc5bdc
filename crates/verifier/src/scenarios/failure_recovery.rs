//! Delete a pod and wait for the orchestrator to replace it.

use crate::command::CommandRunner;
use crate::error::VerifierError;
use crate::lifecycle::{LifecycleVerifier, Mutation};
use crate::phase::{CountRule, UnitExpectation};

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
    let before = steps
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

    let victim = steps
        .record(
            "find pod",
            verifier.first_unit_name(ctx.namespace(), ctx.selector()),
        )
        .await?;
    steps
        .record(
            "delete pod",
            verifier.mutate(ctx.namespace(), &Mutation::DeleteUnit { name: victim }),
        )
        .await?;

    // the replacement must bring the release back to its previous size
    steps
        .record(
            "await recovery",
            verifier.await_observable_phase(
                ctx.namespace(),
                ctx.selector(),
                &UnitExpectation::all_running().with_count(CountRule::Exactly(before.len())),
                verifier.backoff(),
            ),
        )
        .await?;

    Ok(ScenarioOutput::default())
}

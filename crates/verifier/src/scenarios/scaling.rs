//! Scale the front-end deployment up, then back down.

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
    let up = settings.scaling.scale_up_replicas;
    let down = settings.scaling.scale_down_replicas;

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
            "scale up",
            verifier.mutate(
                ctx.namespace(),
                &Mutation::ScaleUp {
                    deployment: ctx.frontend.clone(),
                    replicas: up,
                },
            ),
        )
        .await?;
    steps
        .record(
            "await scale up",
            verifier.await_unit_count(
                ctx.namespace(),
                ctx.selector(),
                &UnitExpectation::count(CountRule::AtLeast(up as usize)),
                verifier.backoff(),
            ),
        )
        .await?;

    steps
        .record(
            "scale down",
            verifier.mutate(
                ctx.namespace(),
                &Mutation::ScaleDown {
                    deployment: ctx.frontend.clone(),
                    replicas: down,
                },
            ),
        )
        .await?;
    // terminating pods still match the selector until they are gone
    steps
        .record(
            "await scale down",
            verifier.await_unit_count(
                ctx.namespace(),
                ctx.selector(),
                &UnitExpectation::count(CountRule::Exactly(down as usize)),
                verifier.backoff(),
            ),
        )
        .await?;

    Ok(ScenarioOutput::default())
}

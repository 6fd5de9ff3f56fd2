use std::sync::Arc;

use conductor_core::{CancellationToken, RetryPolicy, WorkflowDefinition};

use crate::engine::{ScheduleOutcome, WorkflowEngine};

/// Sort by `order` ascending (stable, so ties keep their declaration order)
/// and run strictly one at a time. A failed step without `continueOnFailure`
/// stops scheduling immediately; later steps are never recorded.
pub(crate) async fn run(
    engine: &Arc<WorkflowEngine>,
    def: &WorkflowDefinition,
    retry_policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> ScheduleOutcome {
    let mut steps: Vec<_> = def.steps.iter().collect();
    steps.sort_by_key(|s| s.order);

    let mut step_results = Vec::with_capacity(steps.len());
    let mut fail_stop_error = None;

    for step in steps {
        if cancel.is_cancelled() {
            break;
        }
        let result = engine.execute_step(step, &def.id, retry_policy, cancel).await;
        let stop = !result.success && !step.continue_on_failure;
        if stop {
            fail_stop_error = Some(format!(
                "{}: {}",
                result.step_name,
                result.error.clone().unwrap_or_default()
            ));
        }
        step_results.push(result);
        if stop {
            break;
        }
    }

    ScheduleOutcome {
        step_results,
        fail_stop_error,
    }
}

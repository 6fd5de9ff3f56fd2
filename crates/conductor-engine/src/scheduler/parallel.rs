use std::sync::Arc;

use conductor_core::{CancellationToken, RetryPolicy, WorkflowDefinition};
use tokio::sync::Semaphore;

use crate::engine::{ScheduleOutcome, WorkflowEngine};

/// Launch every step concurrently. All steps run regardless of individual
/// failure -- `continueOnFailure` is effectively true here -- but overall
/// success still reflects the conjunction of per-step outcomes, computed by
/// the caller. A `maxConcurrency` entry in the workflow's `configuration`
/// bounds the worker pool; absent that, concurrency is unbounded.
pub(crate) async fn run(
    engine: &Arc<WorkflowEngine>,
    def: &WorkflowDefinition,
    retry_policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> ScheduleOutcome {
    let max_concurrency = def
        .configuration
        .get("maxConcurrency")
        .and_then(|v| v.as_u64())
        .map(|n| n.max(1) as usize);
    let semaphore = max_concurrency.map(|n| Arc::new(Semaphore::new(n)));

    let mut handles = Vec::with_capacity(def.steps.len());
    for step in def.steps.iter().cloned() {
        let engine = engine.clone();
        let workflow_id = def.id.clone();
        let retry_policy = retry_policy.clone();
        let cancel = cancel.clone();
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = match &semaphore {
                Some(sem) => Some(sem.clone().acquire_owned().await),
                None => None,
            };
            engine.execute_step(&step, &workflow_id, &retry_policy, &cancel).await
        }));
    }

    let mut step_results = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Ok(result) = handle.await {
            step_results.push(result);
        }
    }
    step_results.sort_by_key(|r| r.completed_at);

    ScheduleOutcome {
        step_results,
        fail_stop_error: None,
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use conductor_core::{CancellationToken, RetryPolicy, WorkflowDefinition, WorkflowStep, WorkflowStepResult};
use tracing::error;

use crate::engine::{ScheduleOutcome, WorkflowEngine};

/// Topological execution: a step is runnable once all of its dependencies
/// have a recorded result. Independent ready steps run concurrently. A
/// dependency that failed without `continueOnFailure` cascades a skip to
/// every descendant; cycles are rejected at validation time, so the ready
/// set is guaranteed to drain the whole step set.
pub(crate) async fn run(
    engine: &Arc<WorkflowEngine>,
    def: &WorkflowDefinition,
    retry_policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> ScheduleOutcome {
    let steps_by_id: HashMap<String, WorkflowStep> =
        def.steps.iter().map(|s| (s.id.clone(), s.clone())).collect();
    let mut results: HashMap<String, WorkflowStepResult> = HashMap::new();

    while results.len() < steps_by_id.len() {
        if cancel.is_cancelled() {
            break;
        }

        let ready: Vec<WorkflowStep> = steps_by_id
            .values()
            .filter(|s| !results.contains_key(&s.id))
            .filter(|s| s.dependencies.iter().all(|d| results.contains_key(d)))
            .cloned()
            .collect();

        if ready.is_empty() {
            // No runnable step and not all done: scheduler invariant broken
            // (validation should have rejected this workflow already).
            error!(workflow_id = %def.id, resolved = results.len(), total = steps_by_id.len(), "dependency scheduler stalled with no ready steps");
            break;
        }

        let mut to_run = Vec::new();
        for step in ready {
            match skip_reason(&step, &results, &steps_by_id) {
                Some(message) => {
                    results.insert(step.id.clone(), skipped_result(&step, message));
                }
                None => to_run.push(step),
            }
        }

        if !to_run.is_empty() {
            let mut handles = Vec::with_capacity(to_run.len());
            for step in to_run {
                let engine = engine.clone();
                let workflow_id = def.id.clone();
                let retry_policy = retry_policy.clone();
                let cancel = cancel.clone();
                handles.push(tokio::spawn(async move {
                    let result = engine.execute_step(&step, &workflow_id, &retry_policy, &cancel).await;
                    (step.id, result)
                }));
            }
            for handle in handles {
                if let Ok((id, result)) = handle.await {
                    results.insert(id, result);
                }
            }
        }
    }

    let mut step_results: Vec<_> = results.into_values().collect();
    step_results.sort_by_key(|r| r.completed_at);

    ScheduleOutcome {
        step_results,
        fail_stop_error: None,
    }
}

fn skip_reason(
    step: &WorkflowStep,
    results: &HashMap<String, WorkflowStepResult>,
    steps_by_id: &HashMap<String, WorkflowStep>,
) -> Option<String> {
    for dep in &step.dependencies {
        let dep_result = results.get(dep)?;
        if !dep_result.success {
            let dep_continues = steps_by_id
                .get(dep)
                .map(|s| s.continue_on_failure)
                .unwrap_or(false);
            if !dep_continues {
                return Some(format!("skipped: dependency '{}' failed", dep_result.step_name));
            }
        }
    }
    None
}

fn skipped_result(step: &WorkflowStep, message: String) -> WorkflowStepResult {
    let now = Utc::now();
    WorkflowStepResult {
        step_id: step.id.clone(),
        step_name: step.name.clone(),
        agent_id: step.agent_id.clone(),
        success: false,
        output: None,
        error: Some(message),
        execution_time: Duration::ZERO,
        started_at: now,
        completed_at: now,
        metadata: HashMap::new(),
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use conductor_core::error::ErrorCategory;
use conductor_core::{
    AgentHealthStatus, AgentRef, AgentRequest, CancellationToken, RetryPolicy,
    WorkflowDefinition, WorkflowResult, WorkflowStep, WorkflowStepResult,
    DEFAULT_STATUS_RETENTION, DEFAULT_STEP_TIMEOUT,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::registry::AgentRegistry;
use crate::retry::{should_retry, sleep_for_attempt};
use crate::scheduler::{dependency, parallel, sequential};
use crate::validation::{validate_workflow, ValidationReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ExecutionStatusSnapshot {
    pub running: bool,
    pub completed: bool,
    pub failed: bool,
    pub cancelled: bool,
}

struct ActiveExecution {
    cancel: CancellationToken,
    state: parking_lot::Mutex<ExecutionState>,
}

/// Validates, plans, and executes workflow definitions: the DAG scheduler,
/// retry loop, cancellation propagation, and result aggregation described
/// in the component design.
pub struct WorkflowEngine {
    registry: Arc<AgentRegistry>,
    active: parking_lot::RwLock<HashMap<String, Arc<ActiveExecution>>>,
    default_retry_policy: RetryPolicy,
    status_retention: Duration,
}

/// Assembles an engine over an explicit registry rather than reaching for a
/// global singleton, matching the "no single global singleton is required"
/// design note.
pub struct WorkflowEngineBuilder {
    registry: Arc<AgentRegistry>,
    default_retry_policy: RetryPolicy,
    status_retention: Duration,
}

impl WorkflowEngineBuilder {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            default_retry_policy: RetryPolicy::default(),
            status_retention: DEFAULT_STATUS_RETENTION,
        }
    }

    pub fn default_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_retry_policy = policy;
        self
    }

    pub fn status_retention(mut self, retention: Duration) -> Self {
        self.status_retention = retention;
        self
    }

    pub fn build(self) -> WorkflowEngine {
        WorkflowEngine {
            registry: self.registry,
            active: parking_lot::RwLock::new(HashMap::new()),
            default_retry_policy: self.default_retry_policy,
            status_retention: self.status_retention,
        }
    }
}

impl WorkflowEngine {
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn register_agent(&self, agent: AgentRef) -> Result<(), String> {
        self.registry.register_agent(agent)
    }

    pub async fn unregister_agent(&self, id: &str) -> bool {
        self.registry.unregister_agent(id).await
    }

    pub fn get_agent(&self, id: &str) -> Option<AgentRef> {
        self.registry.get_agent(id)
    }

    pub fn validate_workflow(&self, def: &WorkflowDefinition) -> ValidationReport {
        validate_workflow(def, &self.registry)
    }

    pub fn get_status(&self, execution_id: &str) -> Option<ExecutionStatusSnapshot> {
        let active = self.active.read();
        let entry = active.get(execution_id)?;
        let state = *entry.state.lock();
        Some(ExecutionStatusSnapshot {
            running: state == ExecutionState::Running,
            completed: state == ExecutionState::Completed,
            failed: state == ExecutionState::Failed,
            cancelled: state == ExecutionState::Cancelled,
        })
    }

    pub fn cancel_execution(&self, execution_id: &str) -> bool {
        let active = self.active.read();
        match active.get(execution_id) {
            Some(entry) => {
                entry.cancel.cancel();
                *entry.state.lock() = ExecutionState::Cancelled;
                true
            }
            None => false,
        }
    }

    /// Validate, plan, and execute `def`. Never panics or returns early via
    /// `?` -- every path produces a fully populated `WorkflowResult`.
    pub async fn execute_workflow(
        self: &Arc<Self>,
        def: WorkflowDefinition,
        caller_cancel: CancellationToken,
    ) -> WorkflowResult {
        let started_at = Utc::now();
        let wall_clock_start = Instant::now();

        let report = self.validate_workflow(&def);
        if !report.is_valid() {
            let completed_at = Utc::now();
            warn!(workflow_id = %def.id, errors = ?report.errors, "workflow failed validation");
            return WorkflowResult {
                success: false,
                error: Some(report.errors.join("; ")),
                step_results: Vec::new(),
                execution_time: wall_clock_start.elapsed(),
                started_at,
                completed_at,
                metadata: HashMap::new(),
            };
        }

        let execution_id = Uuid::new_v4().to_string();
        let cancel = match def.timeout {
            Some(timeout) => CancellationToken::with_deadline(&caller_cancel, timeout),
            None => caller_cancel.child_token(),
        };
        self.active.write().insert(
            execution_id.clone(),
            Arc::new(ActiveExecution {
                cancel: cancel.clone(),
                state: parking_lot::Mutex::new(ExecutionState::Running),
            }),
        );

        info!(workflow_id = %def.id, execution_id = %execution_id, mode = ?def.execution_mode, "workflow started");

        let retry_policy = def.retry_policy.clone().unwrap_or_else(|| self.default_retry_policy.clone());
        let outcome = match def.execution_mode {
            conductor_core::ExecutionMode::Sequential => {
                sequential::run(self, &def, &retry_policy, &cancel).await
            }
            conductor_core::ExecutionMode::Parallel => {
                parallel::run(self, &def, &retry_policy, &cancel).await
            }
            conductor_core::ExecutionMode::Dependency => {
                dependency::run(self, &def, &retry_policy, &cancel).await
            }
        };

        let completed_at = Utc::now();
        let execution_time = wall_clock_start.elapsed();

        let was_cancelled = cancel.is_cancelled();
        let (success, error) = if was_cancelled && outcome.fail_stop_error.is_none() {
            (false, Some("cancelled".to_string()))
        } else {
            aggregate_outcome(&outcome.step_results, outcome.fail_stop_error.clone())
        };

        let final_state = if was_cancelled {
            ExecutionState::Cancelled
        } else if success {
            ExecutionState::Completed
        } else {
            ExecutionState::Failed
        };
        if let Some(entry) = self.active.read().get(&execution_id).cloned() {
            *entry.state.lock() = final_state;
        }

        let mut metadata = HashMap::new();
        metadata.insert("executionId".to_string(), execution_id.clone());

        info!(
            workflow_id = %def.id,
            execution_id = %execution_id,
            success,
            step_count = outcome.step_results.len(),
            "workflow completed"
        );

        let engine = self.clone();
        let retention = self.status_retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            engine.active.write().remove(&execution_id);
        });

        WorkflowResult {
            success,
            error,
            step_results: outcome.step_results,
            execution_time,
            started_at,
            completed_at,
            metadata,
        }
    }

    /// The step execution routine from the component design: health gate,
    /// request construction, retry loop, output validation, timestamping.
    pub(crate) async fn execute_step(
        self: &Arc<Self>,
        step: &WorkflowStep,
        workflow_id: &str,
        retry_policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> WorkflowStepResult {
        let started_at = Utc::now();
        let step_start = Instant::now();

        let agent = match self.registry.get_agent(&step.agent_id) {
            Some(agent) => agent,
            None => {
                return finished(
                    step,
                    started_at,
                    step_start,
                    false,
                    None,
                    Some(format!("agent '{}' not registered", step.agent_id)),
                )
            }
        };

        match self.registry.check_health(&step.agent_id).await {
            Some(AgentHealthStatus { is_healthy: false, message, .. }) => {
                return finished(
                    step,
                    started_at,
                    step_start,
                    false,
                    None,
                    Some(format!("agent '{}' unhealthy: {}", step.agent_id, message)),
                )
            }
            Some(_) => {}
            None => {
                return finished(
                    step,
                    started_at,
                    step_start,
                    false,
                    None,
                    Some(format!("agent '{}' not registered", step.agent_id)),
                )
            }
        }

        let request = AgentRequest::new(step.input.clone())
            .with_metadata("stepId", step.id.clone())
            .with_metadata("workflowId", workflow_id.to_string());

        let deadline = step.timeout.unwrap_or(DEFAULT_STEP_TIMEOUT);
        let mut last_output: Option<String> = None;
        let mut last_error: Option<String> = None;
        let mut last_category = ErrorCategory::AgentExecutionFailure;
        let mut cancelled = false;

        for attempt in 1..=retry_policy.max_attempts {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let step_cancel = cancel.child_token();
            debug!(step_id = %step.id, attempt, "executing step");
            let call = agent.execute(request.clone(), step_cancel.clone());

            let timed = tokio::select! {
                result = tokio::time::timeout(deadline, call) => result,
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
            };

            match timed {
                Ok(result) if result.success => {
                    last_output = result.data;
                    last_error = None;
                    break;
                }
                Ok(result) => {
                    last_error = result.error_message;
                    last_category = ErrorCategory::AgentExecutionFailure;
                }
                Err(_) => {
                    last_error = Some(format!("timeout after {:?}", deadline));
                    last_category = ErrorCategory::Timeout;
                }
            }

            let is_last_attempt = attempt >= retry_policy.max_attempts;
            if is_last_attempt || !should_retry(retry_policy, last_category) {
                break;
            }
            sleep_for_attempt(retry_policy, attempt + 1, cancel).await;
        }

        if cancelled {
            return finished(step, started_at, step_start, false, None, Some("cancelled".to_string()));
        }

        if let Some(message) = last_error {
            error!(step_id = %step.id, agent_id = %step.agent_id, error = %message, "step failed with no further attempts remaining");
            return finished(step, started_at, step_start, false, last_output, Some(message));
        }

        for rule in &step.validation_rules {
            let output = last_output.as_deref().unwrap_or("");
            if !rule.check(output) {
                return finished(
                    step,
                    started_at,
                    step_start,
                    false,
                    last_output,
                    Some(rule.error_message.clone()),
                );
            }
        }

        finished(step, started_at, step_start, true, last_output, None)
    }
}

fn finished(
    step: &WorkflowStep,
    started_at: chrono::DateTime<Utc>,
    step_start: Instant,
    success: bool,
    output: Option<String>,
    error: Option<String>,
) -> WorkflowStepResult {
    WorkflowStepResult {
        step_id: step.id.clone(),
        step_name: step.name.clone(),
        agent_id: step.agent_id.clone(),
        success,
        output,
        error,
        execution_time: step_start.elapsed(),
        started_at,
        completed_at: Utc::now(),
        metadata: HashMap::new(),
    }
}

pub(crate) struct ScheduleOutcome {
    pub step_results: Vec<WorkflowStepResult>,
    /// Set by fail-stop schedulers (Sequential, and Dependency's ancestor
    /// failure) when a non-continue-on-failure step halts further
    /// scheduling; carries the step-name-prefixed message from §4.1 step 4.
    pub fail_stop_error: Option<String>,
}

/// Overall success per the component design: every step that ran succeeded,
/// or every failure was `continueOnFailure` and at least one step ran.
fn aggregate_outcome(
    step_results: &[WorkflowStepResult],
    fail_stop_error: Option<String>,
) -> (bool, Option<String>) {
    if let Some(err) = fail_stop_error {
        return (false, Some(err));
    }
    if step_results.is_empty() {
        return (false, Some("no steps were executed".to_string()));
    }
    let failures: Vec<&WorkflowStepResult> = step_results.iter().filter(|r| !r.success).collect();
    if failures.is_empty() {
        (true, None)
    } else {
        let messages: Vec<String> = failures
            .iter()
            .map(|r| format!("{}: {}", r.step_name, r.error.clone().unwrap_or_default()))
            .collect();
        (false, Some(messages.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_reports_success_when_no_failures() {
        let results = vec![WorkflowStepResult {
            step_id: "s1".into(),
            step_name: "s1".into(),
            agent_id: "a1".into(),
            success: true,
            output: Some("ok".into()),
            error: None,
            execution_time: Duration::ZERO,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            metadata: HashMap::new(),
        }];
        let (success, error) = aggregate_outcome(&results, None);
        assert!(success);
        assert!(error.is_none());
    }

    #[test]
    fn aggregate_reports_failure_when_any_step_failed() {
        let results = vec![WorkflowStepResult {
            step_id: "s1".into(),
            step_name: "step one".into(),
            agent_id: "a1".into(),
            success: false,
            output: None,
            error: Some("boom".into()),
            execution_time: Duration::ZERO,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            metadata: HashMap::new(),
        }];
        let (success, error) = aggregate_outcome(&results, None);
        assert!(!success);
        assert!(error.unwrap().contains("boom"));
    }

    #[test]
    fn empty_step_results_is_a_failure() {
        let (success, error) = aggregate_outcome(&[], None);
        assert!(!success);
        assert!(error.is_some());
    }
}

use std::sync::Arc;
use std::time::Duration;

use conductor_core::testing::{BarrierAgent, FailingAgent, FixedResponseAgent, SlowAgent};
use conductor_core::{
    CancellationToken, ExecutionMode, RetryPolicy, RetryStrategy, WorkflowDefinition, WorkflowStep,
};
use conductor_engine::{AgentRegistry, WorkflowEngineBuilder};
use tokio::sync::Barrier;

fn registry() -> Arc<AgentRegistry> {
    init_tracing();
    Arc::new(AgentRegistry::new())
}

/// Installs a `tracing` subscriber scoped to the test harness so `cargo test
/// -- --nocapture` shows the engine's structured logs. The library itself
/// never installs one.
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

#[tokio::test]
async fn sequential_happy_path_runs_in_order_with_combined_output() {
    let registry = registry();
    registry
        .register_agent(Arc::new(FixedResponseAgent::new("a1", "\u{b7}done")))
        .unwrap();
    registry
        .register_agent(Arc::new(FixedResponseAgent::new("a2", "\u{b7}done")))
        .unwrap();
    let engine = Arc::new(WorkflowEngineBuilder::new(registry).build());

    let steps = vec![
        WorkflowStep::new("s1", "step one", "a1", "x").with_order(1),
        WorkflowStep::new("s2", "step two", "a2", "y").with_order(2),
    ];
    let def = WorkflowDefinition::new("w1", "happy path", ExecutionMode::Sequential, steps);

    let result = engine.execute_workflow(def, CancellationToken::new()).await;

    assert!(result.success);
    assert_eq!(result.step_results.len(), 2);
    assert_eq!(result.step_results[0].output.as_deref(), Some("x\u{b7}done"));
    assert_eq!(result.step_results[1].output.as_deref(), Some("y\u{b7}done"));
    assert!(result.step_results[0].completed_at <= result.step_results[1].started_at);
}

#[tokio::test]
async fn parallel_steps_all_pass_the_barrier_before_any_completes() {
    let registry = registry();
    let barrier = Arc::new(Barrier::new(3));
    for id in ["a1", "a2", "a3"] {
        registry
            .register_agent(Arc::new(BarrierAgent::new(id, barrier.clone())))
            .unwrap();
    }
    let engine = Arc::new(WorkflowEngineBuilder::new(registry).build());

    let steps = vec![
        WorkflowStep::new("s1", "step one", "a1", "x"),
        WorkflowStep::new("s2", "step two", "a2", "y"),
        WorkflowStep::new("s3", "step three", "a3", "z"),
    ];
    let def = WorkflowDefinition::new("w1", "parallel", ExecutionMode::Parallel, steps);

    let result = engine.execute_workflow(def, CancellationToken::new()).await;

    assert!(result.success);
    assert_eq!(result.step_results.len(), 3);
}

#[tokio::test]
async fn sequential_fail_stop_halts_before_the_third_step() {
    let registry = registry();
    registry
        .register_agent(Arc::new(FixedResponseAgent::new("a1", "-ok")))
        .unwrap();
    registry
        .register_agent(Arc::new(FailingAgent::new("a2", "boom")))
        .unwrap();
    registry
        .register_agent(Arc::new(FixedResponseAgent::new("a3", "-ok")))
        .unwrap();
    let engine = Arc::new(
        WorkflowEngineBuilder::new(registry)
            .default_retry_policy(RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            })
            .build(),
    );

    let steps = vec![
        WorkflowStep::new("s1", "step one", "a1", "x").with_order(1),
        WorkflowStep::new("s2", "step two", "a2", "y").with_order(2),
        WorkflowStep::new("s3", "step three", "a3", "z").with_order(3),
    ];
    let def = WorkflowDefinition::new("w1", "fail stop", ExecutionMode::Sequential, steps);

    let result = engine.execute_workflow(def, CancellationToken::new()).await;

    assert!(!result.success);
    assert_eq!(result.step_results.len(), 2);
    assert!(result.error.unwrap().contains("boom"));
    assert!(!result.step_results.iter().any(|r| r.step_id == "s3"));
}

#[tokio::test]
async fn continue_on_failure_runs_every_step_but_still_reports_overall_failure() {
    let registry = registry();
    registry
        .register_agent(Arc::new(FixedResponseAgent::new("a1", "-ok")))
        .unwrap();
    registry
        .register_agent(Arc::new(FailingAgent::new("a2", "boom")))
        .unwrap();
    registry
        .register_agent(Arc::new(FixedResponseAgent::new("a3", "-ok")))
        .unwrap();
    let engine = Arc::new(
        WorkflowEngineBuilder::new(registry)
            .default_retry_policy(RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            })
            .build(),
    );

    let steps = vec![
        WorkflowStep::new("s1", "step one", "a1", "x").with_order(1),
        WorkflowStep::new("s2", "step two", "a2", "y")
            .with_order(2)
            .with_continue_on_failure(true),
        WorkflowStep::new("s3", "step three", "a3", "z").with_order(3),
    ];
    let def = WorkflowDefinition::new("w1", "continue on failure", ExecutionMode::Sequential, steps);

    let result = engine.execute_workflow(def, CancellationToken::new()).await;

    assert!(!result.success);
    assert_eq!(result.step_results.len(), 3);
    assert!(result.error.unwrap().contains("step two"));
}

#[tokio::test]
async fn dependency_cascade_skips_descendants_of_a_failed_step() {
    let registry = registry();
    registry
        .register_agent(Arc::new(FailingAgent::new("a1", "boom")))
        .unwrap();
    let engine = Arc::new(
        WorkflowEngineBuilder::new(registry)
            .default_retry_policy(RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            })
            .build(),
    );

    let steps = vec![
        WorkflowStep::new("a", "a", "a1", "x"),
        WorkflowStep::new("b", "b", "a1", "x").with_dependencies(["a".to_string()]),
        WorkflowStep::new("c", "c", "a1", "x").with_dependencies(["b".to_string()]),
    ];
    let def = WorkflowDefinition::new("w1", "cascade", ExecutionMode::Dependency, steps);

    let result = engine.execute_workflow(def, CancellationToken::new()).await;

    assert!(!result.success);
    assert_eq!(result.step_results.len(), 3);
    let by_id = |id: &str| result.step_results.iter().find(|r| r.step_id == id).unwrap();
    assert!(by_id("a").error.as_deref().unwrap().contains("boom"));
    assert!(by_id("b").error.as_deref().unwrap().starts_with("skipped: dependency"));
    assert!(by_id("c").error.as_deref().unwrap().starts_with("skipped: dependency"));
}

#[tokio::test]
async fn retry_exhaustion_calls_the_agent_exactly_max_attempts_times() {
    let registry = registry();
    let agent = Arc::new(FailingAgent::new("a1", "transient"));
    registry.register_agent(agent.clone()).unwrap();
    let engine = Arc::new(
        WorkflowEngineBuilder::new(registry)
            .default_retry_policy(RetryPolicy {
                max_attempts: 3,
                delay: Duration::from_millis(10),
                strategy: RetryStrategy::FixedDelay,
                max_delay: None,
                backoff_multiplier: 2.0,
                allow_list: None,
                deny_list: None,
            })
            .build(),
    );

    let steps = vec![WorkflowStep::new("s1", "step one", "a1", "x")];
    let def = WorkflowDefinition::new("w1", "retry exhaustion", ExecutionMode::Sequential, steps);

    let result = engine.execute_workflow(def, CancellationToken::new()).await;

    assert!(!result.success);
    assert_eq!(agent.call_count(), 3);
    assert!(result.step_results[0].error.as_deref().unwrap().ends_with("transient"));
}

#[tokio::test]
async fn missing_agent_fails_validation_before_execution_starts() {
    let engine = Arc::new(WorkflowEngineBuilder::new(registry()).build());

    let steps = vec![WorkflowStep::new("s1", "step one", "nope", "x")];
    let def = WorkflowDefinition::new("w1", "missing agent", ExecutionMode::Sequential, steps);

    let report = engine.validate_workflow(&def);
    assert!(!report.is_valid());
    assert!(report.errors.iter().any(|e| e.contains("nope")));

    let result = engine.execute_workflow(def, CancellationToken::new()).await;
    assert!(!result.success);
    assert!(result.step_results.is_empty());
}

#[tokio::test]
async fn cancellation_mid_flight_stops_further_steps_without_panicking() {
    let registry = registry();
    registry
        .register_agent(Arc::new(FixedResponseAgent::new("a1", "-ok")))
        .unwrap();
    registry
        .register_agent(Arc::new(SlowAgent::new("a2", Duration::from_millis(300))))
        .unwrap();
    registry
        .register_agent(Arc::new(SlowAgent::new("a3", Duration::from_millis(300))))
        .unwrap();
    let engine = Arc::new(WorkflowEngineBuilder::new(registry).build());

    let steps = vec![
        WorkflowStep::new("s1", "step one", "a1", "x"),
        WorkflowStep::new("s2", "step two", "a2", "y"),
        WorkflowStep::new("s3", "step three", "a3", "z"),
    ];
    let def = WorkflowDefinition::new("w1", "cancel mid flight", ExecutionMode::Parallel, steps);

    // a1 finishes almost instantly; cancel shortly after so a2/a3, still
    // mid-sleep, observe cancellation instead of completing.
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel_clone.cancel();
    });

    let result = engine.execute_workflow(def, cancel).await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("cancelled"));
    assert_eq!(result.step_results.len(), 3);
    let successes = result.step_results.iter().filter(|r| r.success).count();
    assert!((1..=3).contains(&successes));
}

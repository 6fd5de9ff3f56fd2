use conductor_core::cancellation::CancellationToken;
use conductor_core::error::ErrorCategory;
use conductor_core::RetryPolicy;

/// Whether a failure of `category` should be retried under `policy`: the
/// category must be retryable by default (or explicitly allow-listed) and
/// not excluded by the policy's allow/deny lists.
pub fn should_retry(policy: &RetryPolicy, category: ErrorCategory) -> bool {
    let retryable_by_default = matches!(
        category,
        ErrorCategory::AgentExecutionFailure | ErrorCategory::Timeout
    );
    let allowed = policy.permits_retry(category.as_str());
    (retryable_by_default || policy.allow_list.is_some()) && allowed
}

/// Sleep for the policy's computed delay before `attempt`, aborting early if
/// `cancel` trips so a queued retry never outlives a cancelled workflow.
pub async fn sleep_for_attempt(policy: &RetryPolicy, attempt: u32, cancel: &CancellationToken) {
    let delay = policy.delay_for_attempt(attempt);
    if delay.is_zero() {
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = cancel.cancelled() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::RetryStrategy;
    use std::time::Duration;

    #[test]
    fn agent_execution_failure_is_retryable_by_default() {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
            strategy: RetryStrategy::FixedDelay,
            max_delay: None,
            backoff_multiplier: 2.0,
            allow_list: None,
            deny_list: None,
        };
        assert!(should_retry(&policy, ErrorCategory::AgentExecutionFailure));
        assert!(!should_retry(&policy, ErrorCategory::Cancelled));
    }

    #[test]
    fn deny_list_suppresses_otherwise_retryable_category() {
        let mut deny = std::collections::HashSet::new();
        deny.insert("Timeout".to_string());
        let policy = RetryPolicy {
            deny_list: Some(deny),
            ..RetryPolicy::default()
        };
        assert!(!should_retry(&policy, ErrorCategory::Timeout));
    }
}

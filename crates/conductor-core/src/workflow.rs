use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a workflow's steps are scheduled relative to one another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    Sequential,
    Parallel,
    Dependency,
}

/// A condition an agent's output must satisfy for a step to count as
/// successful, checked after the agent call and any retries succeed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "expectedValue")]
pub enum OutputValidationRuleType {
    Contains(String),
    Equals(String),
    StartsWith(String),
    EndsWith(String),
    Regex(String),
    NotEmpty,
    IsJson,
    IsXml,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputValidationRule {
    #[serde(flatten)]
    pub rule: OutputValidationRuleType,
    pub error_message: String,
}

impl OutputValidationRule {
    pub fn new(rule: OutputValidationRuleType, error_message: impl Into<String>) -> Self {
        Self {
            rule,
            error_message: error_message.into(),
        }
    }

    /// Evaluate this rule against an agent's output string.
    pub fn check(&self, output: &str) -> bool {
        match &self.rule {
            OutputValidationRuleType::Contains(expected) => output.contains(expected.as_str()),
            OutputValidationRuleType::Equals(expected) => output == expected,
            OutputValidationRuleType::StartsWith(expected) => output.starts_with(expected.as_str()),
            OutputValidationRuleType::EndsWith(expected) => output.ends_with(expected.as_str()),
            OutputValidationRuleType::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(output))
                .unwrap_or(false),
            OutputValidationRuleType::NotEmpty => !output.trim().is_empty(),
            OutputValidationRuleType::IsJson => serde_json::from_str::<Value>(output).is_ok(),
            OutputValidationRuleType::IsXml => {
                let trimmed = output.trim();
                trimmed.starts_with('<') && trimmed.ends_with('>')
            }
        }
    }
}

/// Backoff shape applied between retry attempts. See
/// [`RetryPolicy::delay_for_attempt`] for the exact formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryStrategy {
    FixedDelay,
    ExponentialBackoff,
    LinearBackoff,
    RandomJitter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "duration_millis")]
    pub delay: Duration,
    pub strategy: RetryStrategy,
    #[serde(default, with = "option_duration_millis")]
    pub max_delay: Option<Duration>,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default)]
    pub allow_list: Option<HashSet<String>>,
    #[serde(default)]
    pub deny_list: Option<HashSet<String>>,
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            strategy: RetryStrategy::FixedDelay,
            max_delay: None,
            backoff_multiplier: default_backoff_multiplier(),
            allow_list: None,
            deny_list: None,
        }
    }
}

impl RetryPolicy {
    pub fn is_valid(&self) -> bool {
        self.max_attempts >= 1
            && self
                .max_delay
                .map(|max| max >= self.delay)
                .unwrap_or(true)
    }

    /// Whether `category` is retryable under this policy: allow-list wins
    /// when present, otherwise anything not on the deny-list is retryable.
    pub fn permits_retry(&self, category: &str) -> bool {
        if let Some(allow) = &self.allow_list {
            return allow.contains(category);
        }
        if let Some(deny) = &self.deny_list {
            return !deny.contains(category);
        }
        true
    }

    /// Delay before attempt `attempt` (1-indexed; attempt 2 is the first
    /// retry). Returns `Duration::ZERO` for the first attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let raw = match self.strategy {
            RetryStrategy::FixedDelay => self.delay,
            RetryStrategy::ExponentialBackoff => {
                let exponent = (attempt - 2) as i32;
                let factor = self.backoff_multiplier.powi(exponent);
                Duration::from_secs_f64(self.delay.as_secs_f64() * factor)
            }
            RetryStrategy::LinearBackoff => {
                Duration::from_secs_f64(self.delay.as_secs_f64() * (attempt - 1) as f64)
            }
            RetryStrategy::RandomJitter => {
                let fraction: f64 = rand::random();
                Duration::from_secs_f64(self.delay.as_secs_f64() * fraction)
            }
        };
        match self.max_delay {
            Some(max) if raw > max => max,
            _ => raw,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    pub agent_id: String,
    pub input: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub dependencies: HashSet<String>,
    #[serde(default)]
    pub configuration: HashMap<String, Value>,
    #[serde(default, with = "option_duration_millis")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub continue_on_failure: bool,
    #[serde(default)]
    pub validation_rules: Vec<OutputValidationRule>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, name: impl Into<String>, agent_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent_id: agent_id.into(),
            input: input.into(),
            order: 0,
            dependencies: HashSet::new(),
            configuration: HashMap::new(),
            timeout: None,
            continue_on_failure: false,
            validation_rules: Vec::new(),
        }
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = String>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    pub fn with_continue_on_failure(mut self, continue_on_failure: bool) -> Self {
        self.continue_on_failure = continue_on_failure;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_validation_rule(mut self, rule: OutputValidationRule) -> Self {
        self.validation_rules.push(rule);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub execution_mode: ExecutionMode,
    pub steps: Vec<WorkflowStep>,
    #[serde(default, with = "option_duration_millis")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub configuration: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, execution_mode: ExecutionMode, steps: Vec<WorkflowStep>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            execution_mode,
            steps,
            timeout: None,
            retry_policy: None,
            configuration: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn effective_retry_policy(&self) -> RetryPolicy {
        self.retry_policy.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStepResult {
    pub step_id: String,
    pub step_name: String,
    pub agent_id: String,
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    pub execution_time: Duration,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub error: Option<String>,
    pub step_results: Vec<WorkflowStepResult>,
    pub execution_time: Duration,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

mod duration_millis {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod option_duration_millis {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_default_is_three_attempts_fixed_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(1));
        assert_eq!(policy.strategy, RetryStrategy::FixedDelay);
    }

    #[test]
    fn exponential_backoff_doubles_each_attempt_and_caps_at_max_delay() {
        let policy = RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(100),
            strategy: RetryStrategy::ExponentialBackoff,
            max_delay: Some(Duration::from_millis(300)),
            backoff_multiplier: 2.0,
            allow_list: None,
            deny_list: None,
        };
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(300)); // would be 400, capped
    }

    #[test]
    fn linear_backoff_scales_by_attempt_count() {
        let policy = RetryPolicy {
            max_attempts: 4,
            delay: Duration::from_millis(50),
            strategy: RetryStrategy::LinearBackoff,
            max_delay: None,
            backoff_multiplier: 2.0,
            allow_list: None,
            deny_list: None,
        };
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(150));
    }

    #[test]
    fn deny_list_suppresses_retry_for_named_category() {
        let mut deny = HashSet::new();
        deny.insert("OutputValidation".to_string());
        let policy = RetryPolicy {
            deny_list: Some(deny),
            ..RetryPolicy::default()
        };
        assert!(!policy.permits_retry("OutputValidation"));
        assert!(policy.permits_retry("AgentExecutionFailure"));
    }

    #[test]
    fn contains_rule_checks_substring() {
        let rule = OutputValidationRule::new(
            OutputValidationRuleType::Contains("done".to_string()),
            "must contain done".to_string(),
        );
        assert!(rule.check("task done"));
        assert!(!rule.check("task pending"));
    }

    #[test]
    fn is_valid_rejects_zero_attempts() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(!policy.is_valid());
    }
}

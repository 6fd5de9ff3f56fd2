use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of one agent invocation.
///
/// Exactly one of `data`/`error_message` is populated, enforced by
/// constructing through [`AgentResult::success`] or [`AgentResult::error`]
/// rather than the struct literal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    pub data: Option<String>,
    pub error_message: Option<String>,
    pub processing_time: Duration,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl AgentResult {
    pub fn success(data: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            error_message: None,
            processing_time: Duration::ZERO,
            metadata: HashMap::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error_message: Some(message.into()),
            processing_time: Duration::ZERO,
            metadata: HashMap::new(),
        }
    }

    pub fn with_processing_time(mut self, duration: Duration) -> Self {
        self.processing_time = duration;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

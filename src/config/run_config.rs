//! Per-invocation settings.

use serde::{Deserialize, Serialize};

use crate::types::StreamingMode;

/// Default cap on model calls within one invocation.
pub const DEFAULT_MAX_LLM_CALLS: usize = 500;

/// Settings that apply to a single invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub streaming_mode: StreamingMode,
    /// `0` disables the limit.
    pub max_llm_calls: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            streaming_mode: StreamingMode::None,
            max_llm_calls: DEFAULT_MAX_LLM_CALLS,
        }
    }
}

impl RunConfig {
    pub fn with_streaming_mode(mut self, mode: StreamingMode) -> Self {
        self.streaming_mode = mode;
        self
    }

    pub fn with_max_llm_calls(mut self, limit: usize) -> Self {
        self.max_llm_calls = limit;
        self
    }

    /// Whether `count` calls exceed the configured limit.
    pub fn exceeds_llm_call_limit(&self, count: usize) -> bool {
        self.max_llm_calls > 0 && count > self.max_llm_calls
    }
}

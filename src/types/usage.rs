//! Token usage counters.

use serde::{Deserialize, Serialize};

/// Token usage for one model response.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub candidates_tokens: u32,
    pub total_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_content_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts_tokens: Option<u32>,
}

impl Usage {
    /// Merge another usage into this one (accumulate).
    pub fn merge(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.candidates_tokens += other.candidates_tokens;
        self.total_tokens += other.total_tokens;
        if let Some(v) = other.cached_content_tokens {
            *self.cached_content_tokens.get_or_insert(0) += v;
        }
        if let Some(v) = other.thoughts_tokens {
            *self.thoughts_tokens.get_or_insert(0) += v;
        }
    }
}

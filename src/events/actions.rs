//! Side-effect bundle attached to an event.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::auth::AuthConfig;

/// Side effects an event requests when it is applied to a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventActions {
    /// Skip summarizing a function response; the event ends the turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_summarization: Option<bool>,
    /// Keys to merge into session state.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub state_delta: HashMap<String, serde_json::Value>,
    /// Hand the conversation to the named agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_to_agent: Option<String>,
    /// Credentials requested by tools, keyed by the originating function-call id.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub requested_auth_configs: HashMap<String, AuthConfig>,
}

impl EventActions {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn skips_summarization(&self) -> bool {
        self.skip_summarization.unwrap_or(false)
    }

    /// Merge `other` into `self`.
    ///
    /// State deltas and auth maps are unioned (later keys overwrite); the skip
    /// flag is true if either side is true; a later transfer target wins.
    pub fn merge(&mut self, other: EventActions) {
        self.state_delta.extend(other.state_delta);
        self.requested_auth_configs
            .extend(other.requested_auth_configs);
        self.skip_summarization = merge_flag(self.skip_summarization, other.skip_summarization);
        if other.transfer_to_agent.is_some() {
            self.transfer_to_agent = other.transfer_to_agent;
        }
    }
}

fn merge_flag(current: Option<bool>, incoming: Option<bool>) -> Option<bool> {
    match (current, incoming) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (None, None) => None,
        _ => Some(false),
    }
}

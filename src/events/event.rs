//! One durable step of conversation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::actions::EventActions;
use crate::models::LlmResponse;
use crate::types::{Content, FunctionCall, FunctionResponse, Part};

/// Author token used for events originating from the end user.
pub const USER_AUTHOR: &str = "user";

/// A model output or tool outcome, plus the side effects it carries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub invocation_id: String,
    /// `"user"` or the name of the agent that produced the event.
    pub author: String,
    #[serde(flatten)]
    pub response: LlmResponse,
    #[serde(default)]
    pub actions: EventActions,
    /// Ids of function calls whose results will arrive in a later turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_running_tool_ids: Option<BTreeSet<String>>,
    /// Dotted agent ancestry (`root.child.grandchild`) scoping history visibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(invocation_id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: Self::new_id(),
            invocation_id: invocation_id.into(),
            author: author.into(),
            response: LlmResponse::default(),
            actions: EventActions::default(),
            long_running_tool_ids: None,
            branch: None,
            timestamp: Utc::now(),
        }
    }

    /// Generate a fresh event id.
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.response.content = Some(content);
        self
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_actions(mut self, actions: EventActions) -> Self {
        self.actions = actions;
        self
    }

    pub fn content(&self) -> Option<&Content> {
        self.response.content.as_ref()
    }

    pub fn is_partial(&self) -> bool {
        self.response.partial
    }

    pub fn is_from_user(&self) -> bool {
        self.author == USER_AUTHOR
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.content()
            .map(Content::function_calls)
            .unwrap_or_default()
    }

    pub fn function_responses(&self) -> Vec<&FunctionResponse> {
        self.content()
            .map(Content::function_responses)
            .unwrap_or_default()
    }

    /// Whether the last part is a code-execution result the model has not seen yet.
    pub fn has_trailing_code_execution_result(&self) -> bool {
        self.content()
            .and_then(|content| content.parts.last())
            .is_some_and(|part| matches!(part, Part::CodeExecutionResult(_)))
    }

    /// Whether this event ends the agent's turn.
    ///
    /// Skip-summarization and long-running tool ids end the turn outright.
    /// Otherwise the event must carry no function calls or results, must be
    /// complete, and must not end on a pending code-execution result.
    pub fn is_final_response(&self) -> bool {
        if self.actions.skips_summarization()
            || self
                .long_running_tool_ids
                .as_ref()
                .is_some_and(|ids| !ids.is_empty())
        {
            return true;
        }
        self.function_calls().is_empty()
            && self.function_responses().is_empty()
            && !self.is_partial()
            && !self.has_trailing_code_execution_result()
    }
}

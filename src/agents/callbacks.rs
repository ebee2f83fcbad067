//! Interception points around model and tool calls.
//!
//! Each list runs in order. For "before" hooks the first `Some` short-circuits
//! the call it guards; for "after" hooks the first `Some` replaces the result.

use std::sync::Arc;

use serde_json::Value;

use super::callback_context::CallbackContext;
use crate::models::{LlmRequest, LlmResponse};
use crate::tools::{Tool, ToolContext};

/// May edit the request, or answer it without calling the model.
pub type BeforeModelCallback =
    Arc<dyn Fn(&CallbackContext, &mut LlmRequest) -> Option<LlmResponse> + Send + Sync>;

/// May replace a model response.
pub type AfterModelCallback =
    Arc<dyn Fn(&CallbackContext, &LlmResponse) -> Option<LlmResponse> + Send + Sync>;

/// May edit the arguments, or answer the call without running the tool.
pub type BeforeToolCallback =
    Arc<dyn Fn(&dyn Tool, &mut Value, &ToolContext) -> Option<Value> + Send + Sync>;

/// May replace a tool result. Receives the arguments and the result.
pub type AfterToolCallback =
    Arc<dyn Fn(&dyn Tool, &Value, &ToolContext, &Value) -> Option<Value> + Send + Sync>;

pub fn before_model(
    f: impl Fn(&CallbackContext, &mut LlmRequest) -> Option<LlmResponse> + Send + Sync + 'static,
) -> BeforeModelCallback {
    Arc::new(f)
}

pub fn after_model(
    f: impl Fn(&CallbackContext, &LlmResponse) -> Option<LlmResponse> + Send + Sync + 'static,
) -> AfterModelCallback {
    Arc::new(f)
}

pub fn before_tool(
    f: impl Fn(&dyn Tool, &mut Value, &ToolContext) -> Option<Value> + Send + Sync + 'static,
) -> BeforeToolCallback {
    Arc::new(f)
}

pub fn after_tool(
    f: impl Fn(&dyn Tool, &Value, &ToolContext, &Value) -> Option<Value> + Send + Sync + 'static,
) -> AfterToolCallback {
    Arc::new(f)
}

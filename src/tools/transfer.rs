//! Built-in tool that hands the conversation to another agent.

use serde_json::Value;

use super::tool::FunctionTool;
use super::types::ToolParameters;
use crate::error::KestrelError;

pub const TRANSFER_TO_AGENT_TOOL_NAME: &str = "transfer_to_agent";

/// `transfer_to_agent(agent_name)`: records the target on the call's actions.
///
/// The transfer itself happens after the function response event is emitted.
pub fn transfer_to_agent_tool() -> FunctionTool {
    FunctionTool::new(
        TRANSFER_TO_AGENT_TOOL_NAME,
        "Transfer the question to another agent.",
        ToolParameters::object()
            .string("agent_name", "Name of the agent to transfer to", true)
            .build(),
        |args, ctx| async move {
            let agent_name = args.get_str("agent_name")?.to_string();
            ctx.transfer_to_agent(agent_name);
            Ok::<_, KestrelError>(Value::Null)
        },
    )
}

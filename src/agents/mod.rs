//! Agents, the agent tree and the contexts they run with.

pub mod base_agent;
pub mod callback_context;
pub mod callbacks;
pub mod invocation_context;
pub mod llm_agent;

pub use base_agent::{
    find_agent, find_parent, validate_agent_tree, BaseAgent, EventStream, ToolCapableAgent,
};
pub use callback_context::{CallbackContext, ReadonlyContext};
pub use callbacks::{
    after_model, after_tool, before_model, before_tool, AfterModelCallback, AfterToolCallback,
    BeforeModelCallback, BeforeToolCallback,
};
pub use invocation_context::{new_invocation_id, InvocationContext};
pub use llm_agent::{IncludeContents, Instruction, InstructionProvider, LlmAgent};

//! Agent trait and tree helpers.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::BoxStream;

use super::invocation_context::InvocationContext;
use super::llm_agent::LlmAgent;
use crate::error::{KestrelError, Result};
use crate::events::{Event, USER_AUTHOR};
use crate::tools::Tool;

/// Lazily produced events of one agent run.
pub type EventStream = BoxStream<'static, Result<Event>>;

/// An agent in the tree.
///
/// Concrete kinds expose extra capabilities through the `as_*` accessors
/// instead of downcasting.
pub trait BaseAgent: Send + Sync {
    /// Unique name within the tree.
    fn name(&self) -> &str;

    /// Used by other agents to decide whether to transfer here.
    fn description(&self) -> &str {
        ""
    }

    fn sub_agents(&self) -> &[Arc<dyn BaseAgent>] {
        &[]
    }

    /// Run the agent for one invocation.
    fn run_async(self: Arc<Self>, ctx: InvocationContext) -> EventStream;

    /// Run the agent over a live (bidirectional) connection.
    fn run_live(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        self.run_async(ctx)
    }

    fn as_llm_agent(&self) -> Option<&LlmAgent> {
        None
    }

    fn as_tool_capable(&self) -> Option<&dyn ToolCapableAgent> {
        None
    }

    /// Find a descendant by name.
    fn find_sub_agent(&self, name: &str) -> Option<Arc<dyn BaseAgent>> {
        self.sub_agents()
            .iter()
            .find_map(|sub| find_agent(sub, name))
    }
}

/// An agent that can offer tools to the model.
pub trait ToolCapableAgent: Send + Sync {
    /// Tools exactly as they will be declared on the request.
    fn canonical_tools(&self) -> Vec<Arc<dyn Tool>>;
}

/// Find `name` in the tree rooted at `root`, `root` included.
pub fn find_agent(root: &Arc<dyn BaseAgent>, name: &str) -> Option<Arc<dyn BaseAgent>> {
    if root.name() == name {
        return Some(Arc::clone(root));
    }
    root.find_sub_agent(name)
}

/// Find the agent whose direct sub-agents include `name`.
pub fn find_parent(root: &Arc<dyn BaseAgent>, name: &str) -> Option<Arc<dyn BaseAgent>> {
    for sub in root.sub_agents() {
        if sub.name() == name {
            return Some(Arc::clone(root));
        }
        if let Some(parent) = find_parent(sub, name) {
            return Some(parent);
        }
    }
    None
}

/// Reject trees with empty, reserved or duplicate agent names.
pub fn validate_agent_tree(root: &Arc<dyn BaseAgent>) -> Result<()> {
    fn visit<'a>(agent: &'a Arc<dyn BaseAgent>, seen: &mut HashSet<&'a str>) -> Result<()> {
        let name = agent.name();
        if name.trim().is_empty() {
            return Err(KestrelError::Configuration("agent name must not be empty".into()));
        }
        if name == USER_AUTHOR {
            return Err(KestrelError::Configuration(format!(
                "agent name `{USER_AUTHOR}` is reserved for end-user input"
            )));
        }
        if !seen.insert(name) {
            return Err(KestrelError::Configuration(format!(
                "agent name `{name}` appears more than once in the tree"
            )));
        }
        agent
            .sub_agents()
            .iter()
            .try_for_each(|sub| visit(sub, seen))
    }
    visit(root, &mut HashSet::new())
}

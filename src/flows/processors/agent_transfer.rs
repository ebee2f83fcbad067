use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{find_parent, BaseAgent, InvocationContext, LlmAgent};
use crate::error::Result;
use crate::events::Event;
use crate::flows::RequestProcessor;
use crate::models::LlmRequest;
use crate::tools::{transfer_to_agent_tool, Tool, TRANSFER_TO_AGENT_TOOL_NAME};

/// Lists the agents this one may hand off to and declares `transfer_to_agent`.
#[derive(Debug, Default)]
pub struct AgentTransferRequestProcessor;

#[async_trait]
impl RequestProcessor for AgentTransferRequestProcessor {
    fn name(&self) -> &'static str {
        "agent_transfer"
    }

    async fn process(
        &self,
        ctx: &InvocationContext,
        agent: &LlmAgent,
        request: &mut LlmRequest,
    ) -> Result<Vec<Event>> {
        let parent = find_parent(&ctx.root_agent, agent.name())
            .filter(|parent| parent.as_llm_agent().is_some());
        let targets = transfer_targets(agent, parent.as_ref());
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let parent_name = parent
            .as_ref()
            .filter(|_| !agent.disallow_transfer_to_parent())
            .map(|parent| parent.name().to_string());
        request.append_instructions(&[transfer_instructions(&targets, parent_name.as_deref())]);
        let tool: Arc<dyn Tool> = Arc::new(transfer_to_agent_tool());
        request.append_tools(&[tool]);
        Ok(Vec::new())
    }
}

/// Sub-agents, then the parent and peers when allowed.
fn transfer_targets(
    agent: &LlmAgent,
    parent: Option<&Arc<dyn BaseAgent>>,
) -> Vec<Arc<dyn BaseAgent>> {
    let mut targets: Vec<Arc<dyn BaseAgent>> = agent.sub_agents().to_vec();
    let Some(parent) = parent else {
        return targets;
    };
    if !agent.disallow_transfer_to_parent() {
        targets.push(Arc::clone(parent));
    }
    if !agent.disallow_transfer_to_peers() {
        targets.extend(
            parent
                .sub_agents()
                .iter()
                .filter(|peer| peer.name() != agent.name())
                .cloned(),
        );
    }
    targets
}

fn transfer_instructions(targets: &[Arc<dyn BaseAgent>], parent: Option<&str>) -> String {
    let listing = targets
        .iter()
        .map(|target| {
            format!(
                "Agent name: {}\nAgent description: {}",
                target.name(),
                target.description()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    let mut text = format!(
        "You can hand the conversation to one of these agents:\n\n{listing}\n\n\
         If your own description makes you the best fit for the request, answer it yourself.\n\n\
         If another agent's description fits the request better, call the \
         `{TRANSFER_TO_AGENT_TOOL_NAME}` function with that agent's name. When transferring, \
         generate no text other than the function call."
    );
    if let Some(parent) = parent {
        text.push_str(&format!(
            "\n\nYour parent agent is {parent}. If neither you nor the agents above fit the \
             request, transfer to your parent agent."
        ));
    }
    text
}

use async_trait::async_trait;

use crate::agents::{BaseAgent, InvocationContext, LlmAgent};
use crate::error::Result;
use crate::events::Event;
use crate::flows::RequestProcessor;
use crate::models::LlmRequest;

/// Tells the model its own name and description.
#[derive(Debug, Default)]
pub struct IdentityRequestProcessor;

#[async_trait]
impl RequestProcessor for IdentityRequestProcessor {
    fn name(&self) -> &'static str {
        "identity"
    }

    async fn process(
        &self,
        _ctx: &InvocationContext,
        agent: &LlmAgent,
        request: &mut LlmRequest,
    ) -> Result<Vec<Event>> {
        let mut identity = format!(
            "You are an agent. Your internal name is \"{}\".",
            agent.name()
        );
        if !agent.description().is_empty() {
            identity.push_str(&format!(
                " The description about you is \"{}\"",
                agent.description()
            ));
        }
        request.append_instructions(&[identity]);
        Ok(Vec::new())
    }
}

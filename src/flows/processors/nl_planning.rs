use async_trait::async_trait;

use crate::agents::{BaseAgent, CallbackContext, InvocationContext, LlmAgent, ReadonlyContext};
use crate::error::Result;
use crate::events::Event;
use crate::flows::{RequestProcessor, ResponseProcessor};
use crate::models::{LlmRequest, LlmResponse};
use crate::types::Part;

/// Appends the planner's instruction and clears thought flags from history.
#[derive(Debug, Default)]
pub struct NlPlanningRequestProcessor;

#[async_trait]
impl RequestProcessor for NlPlanningRequestProcessor {
    fn name(&self) -> &'static str {
        "nl_planning"
    }

    async fn process(
        &self,
        ctx: &InvocationContext,
        agent: &LlmAgent,
        request: &mut LlmRequest,
    ) -> Result<Vec<Event>> {
        let Some(planner) = agent.planner() else {
            return Ok(Vec::new());
        };
        let state = ctx.session_state().await;
        if let Some(instruction) =
            planner.build_planning_instruction(&ReadonlyContext::new(ctx, &state), request)
        {
            request.append_instructions(&[instruction]);
        }
        for part in request.contents.iter_mut().flat_map(|c| c.parts.iter_mut()) {
            if let Part::Text { thought, .. } = part {
                *thought = false;
            }
        }
        Ok(Vec::new())
    }
}

/// Lets the planner rewrite response parts, typically marking reasoning as thought.
#[derive(Debug, Default)]
pub struct NlPlanningResponseProcessor;

#[async_trait]
impl ResponseProcessor for NlPlanningResponseProcessor {
    fn name(&self) -> &'static str {
        "nl_planning"
    }

    async fn process(
        &self,
        ctx: &InvocationContext,
        agent: &LlmAgent,
        response: &mut LlmResponse,
    ) -> Result<Vec<Event>> {
        let Some(planner) = agent.planner() else {
            return Ok(Vec::new());
        };
        let Some(content) = response.content.as_mut() else {
            return Ok(Vec::new());
        };
        if content.parts.is_empty() {
            return Ok(Vec::new());
        }
        let callback_ctx = CallbackContext::new(ctx.clone(), ctx.session_state().await);
        if let Some(parts) = planner.process_planning_response(&callback_ctx, &content.parts) {
            content.parts = parts;
        }

        let actions = callback_ctx.actions();
        if actions.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Event::new(ctx.invocation_id.clone(), agent.name())
            .with_branch(ctx.branch.clone())
            .with_actions(actions)])
    }
}

//! The invocation loop.

use std::fmt;
use std::sync::Arc;

use async_stream::try_stream;
use chrono::Utc;
use futures::StreamExt;

use super::functions::{self, long_running_function_call_ids, populate_client_function_call_ids};
use super::processors::{
    AgentTransferRequestProcessor, BasicRequestProcessor, CodeExecutionRequestProcessor,
    CodeExecutionResponseProcessor, ContentsRequestProcessor, IdentityRequestProcessor,
    InstructionsRequestProcessor, NlPlanningRequestProcessor, NlPlanningResponseProcessor,
    OutputSchemaResponseProcessor,
};
use super::{debug_enabled, RequestProcessor, ResponseProcessor};
use crate::agents::{
    BaseAgent, CallbackContext, EventStream, InvocationContext, LlmAgent, ToolCapableAgent,
};
use crate::auth::AuthPreprocessor;
use crate::error::{KestrelError, Result};
use crate::events::{Event, EventActions};
use crate::models::{LlmRequest, LlmResponse, LlmResponseStream};
use crate::types::StreamingMode;

/// Drives an [`LlmAgent`]: repeated model steps until a final response.
///
/// Each step builds a fresh request through the request pipeline, calls the
/// model, runs every response through the response pipeline, emits it as an
/// event and dispatches any function calls it carries.
pub struct LlmFlow {
    request_processors: Vec<Box<dyn RequestProcessor>>,
    response_processors: Vec<Box<dyn ResponseProcessor>>,
}

impl fmt::Debug for LlmFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmFlow")
            .field("request_processors", &self.request_processor_names())
            .field(
                "response_processors",
                &self
                    .response_processors
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl LlmFlow {
    pub fn new(
        request_processors: Vec<Box<dyn RequestProcessor>>,
        response_processors: Vec<Box<dyn ResponseProcessor>>,
    ) -> Self {
        Self {
            request_processors,
            response_processors,
        }
    }

    /// The standard pipelines, without agent transfer.
    pub fn single() -> Self {
        Self::new(
            vec![
                Box::new(BasicRequestProcessor),
                Box::new(AuthPreprocessor),
                Box::new(InstructionsRequestProcessor),
                Box::new(IdentityRequestProcessor),
                Box::new(ContentsRequestProcessor),
                Box::new(NlPlanningRequestProcessor),
                Box::new(CodeExecutionRequestProcessor),
            ],
            vec![
                Box::new(NlPlanningResponseProcessor),
                Box::new(CodeExecutionResponseProcessor),
                Box::new(OutputSchemaResponseProcessor),
            ],
        )
    }

    /// [`LlmFlow::single`] plus the agent-transfer stage.
    pub fn auto() -> Self {
        let mut flow = Self::single();
        flow.request_processors
            .push(Box::new(AgentTransferRequestProcessor));
        flow
    }

    pub fn request_processor_names(&self) -> Vec<&'static str> {
        self.request_processors.iter().map(|p| p.name()).collect()
    }

    /// Run steps until one ends on a final response, produces nothing, or the
    /// invocation is ended.
    pub fn run_async(self: Arc<Self>, ctx: InvocationContext, agent: Arc<LlmAgent>) -> EventStream {
        Box::pin(try_stream! {
            let mut step = 0usize;
            while !ctx.is_end_of_invocation() {
                step += 1;
                if debug_enabled() {
                    tracing::debug!(
                        invocation_id = %ctx.invocation_id,
                        agent = %agent.name(),
                        step,
                        "step started"
                    );
                }
                let mut last_event = None;
                let mut events = Arc::clone(&self).run_one_step(ctx.clone(), Arc::clone(&agent));
                while let Some(event) = events.next().await {
                    let event = event?;
                    last_event = Some(event.clone());
                    yield event;
                }
                let Some(last) = last_event else {
                    break;
                };
                ensure_complete(&last)?;
                if last.is_final_response() {
                    break;
                }
            }
        })
    }

    fn run_one_step(self: Arc<Self>, ctx: InvocationContext, agent: Arc<LlmAgent>) -> EventStream {
        Box::pin(try_stream! {
            let mut request = LlmRequest::new();
            for processor in &self.request_processors {
                if ctx.is_end_of_invocation() {
                    break;
                }
                for event in processor.process(&ctx, &agent, &mut request).await? {
                    yield event;
                }
            }
            if !ctx.is_end_of_invocation() {
                for tool in agent.canonical_tools() {
                    request.append_tools(std::slice::from_ref(&tool));
                    tool.process_llm_request(&ctx, &mut request).await?;
                }
            }

            if !ctx.is_end_of_invocation() {
                let placeholder = Event::new(ctx.invocation_id.clone(), agent.name())
                    .with_branch(ctx.branch.clone());
                let callback_ctx = CallbackContext::new(ctx.clone(), ctx.session_state().await);
                let mut responses = call_llm(&ctx, &agent, &callback_ctx, &mut request).await?;

                while let Some(response) = responses.next().await {
                    let mut response = response?;
                    for processor in &self.response_processors {
                        for event in processor.process(&ctx, &agent, &mut response).await? {
                            yield event;
                        }
                    }
                    if response.content.is_none()
                        && response.error_code.is_none()
                        && !response.interrupted
                    {
                        continue;
                    }

                    let event =
                        finalize_model_response_event(&placeholder, &request, response, callback_ctx.actions());
                    yield event.clone();
                    if event.is_partial() || event.function_calls().is_empty() {
                        continue;
                    }

                    let dispatched = functions::handle_function_calls(
                        &ctx,
                        &agent,
                        &event,
                        &request.tools_dict,
                        None,
                    )
                    .await?;
                    let Some(response_event) = dispatched else {
                        continue;
                    };
                    if let Some(auth_event) = functions::generate_auth_event(&ctx, &response_event)? {
                        yield auth_event;
                    }
                    let transfer = response_event.actions.transfer_to_agent.clone();
                    yield response_event;

                    if let Some(target) = transfer {
                        let next = ctx
                            .find_agent(&target)
                            .ok_or_else(|| KestrelError::AgentNotFound(target.clone()))?;
                        tracing::debug!(
                            invocation_id = %ctx.invocation_id,
                            from = %agent.name(),
                            to = %target,
                            "transferring to agent"
                        );
                        let mut transferred = Arc::clone(&next).run_async(ctx.for_agent(next));
                        while let Some(event) = transferred.next().await {
                            yield event?;
                        }
                    }
                }
            }
        })
    }
}

/// A step must not end on a streamed chunk.
fn ensure_complete(last: &Event) -> Result<()> {
    if last.is_partial() {
        return Err(KestrelError::PartialLastEvent);
    }
    Ok(())
}

/// Before-model callbacks, then the model (or the callback's answer).
/// After-model callbacks apply to every model response.
async fn call_llm(
    ctx: &InvocationContext,
    agent: &Arc<LlmAgent>,
    callback_ctx: &CallbackContext,
    request: &mut LlmRequest,
) -> Result<LlmResponseStream> {
    if let Some(response) = agent
        .before_model_callbacks()
        .iter()
        .find_map(|callback| callback(callback_ctx, &mut *request))
    {
        return Ok(Box::pin(futures::stream::iter(vec![Ok::<_, KestrelError>(response)])));
    }

    let model = agent.canonical_model(ctx)?;
    ctx.increment_llm_call_count()?;
    let stream = ctx.run_config.streaming_mode == StreamingMode::Sse;
    if debug_enabled() {
        tracing::debug!(
            invocation_id = %ctx.invocation_id,
            agent = %agent.name(),
            model = %model.model(),
            stream,
            contents = request.contents.len(),
            tools = request.tools_dict.len(),
            "calling model"
        );
    }
    let responses = model.generate_content(request, stream).await?;

    let agent = Arc::clone(agent);
    let callback_ctx = callback_ctx.clone();
    Ok(Box::pin(responses.map(move |response| {
        response.map(|response| after_model(&agent, &callback_ctx, response))
    })))
}

fn after_model(agent: &LlmAgent, ctx: &CallbackContext, response: LlmResponse) -> LlmResponse {
    agent
        .after_model_callbacks()
        .iter()
        .find_map(|callback| callback(ctx, &response))
        .unwrap_or(response)
}

/// Turn a processed response into a durable event.
fn finalize_model_response_event(
    placeholder: &Event,
    request: &LlmRequest,
    response: LlmResponse,
    actions: EventActions,
) -> Event {
    let mut event = placeholder.clone();
    event.id = Event::new_id();
    event.timestamp = Utc::now();
    event.response = response;
    event.actions.merge(actions);
    if let Some(content) = event.response.content.as_mut() {
        populate_client_function_call_ids(content);
    }
    let long_running = long_running_function_call_ids(&event.function_calls(), &request.tools_dict);
    if !long_running.is_empty() {
        event.long_running_tool_ids = Some(long_running);
    }
    event
}

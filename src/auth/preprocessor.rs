//! Resumes tool calls once the client has supplied the credentials they asked for.

use std::collections::HashSet;

use async_trait::async_trait;

use super::{AuthConfig, AuthToolArguments, REQUEST_CREDENTIAL_FUNCTION_CALL_NAME};
use crate::agents::{BaseAgent, InvocationContext, LlmAgent, ToolCapableAgent};
use crate::error::{KestrelError, Result};
use crate::events::{Event, EventActions};
use crate::flows::functions::{handle_function_calls_with_state, ToolsDict};
use crate::flows::RequestProcessor;
use crate::models::LlmRequest;
use crate::sessions::StateMap;

/// Request stage handling answers to `request_credential` prompts.
///
/// When the latest user event answers credential prompts, each returned
/// credential is stored under its temporary state key through a content-less
/// state event, and the tool calls that asked for them are run again.
#[derive(Debug, Default)]
pub struct AuthPreprocessor;

#[async_trait]
impl RequestProcessor for AuthPreprocessor {
    fn name(&self) -> &'static str {
        "auth_preprocessor"
    }

    async fn process(
        &self,
        ctx: &InvocationContext,
        agent: &LlmAgent,
        _request: &mut LlmRequest,
    ) -> Result<Vec<Event>> {
        let events = ctx.session.read().await.events.clone();
        // Only an answer the agent has not reacted to yet triggers a resume.
        let Some(user_index) = events.iter().rposition(|event| event.content().is_some()) else {
            return Ok(Vec::new());
        };
        let user_event = &events[user_index];
        if !user_event.is_from_user() {
            return Ok(Vec::new());
        }

        let mut prompt_ids = HashSet::new();
        let mut credentials = StateMap::new();
        for response in user_event.function_responses() {
            if response.name != REQUEST_CREDENTIAL_FUNCTION_CALL_NAME {
                continue;
            }
            let config: AuthConfig = serde_json::from_value(response.response.clone())
                .map_err(|e| {
                    KestrelError::InvalidArgument(format!("malformed credential response: {e}"))
                })?;
            let Some(credential) = config
                .exchanged_auth_credential
                .clone()
                .or_else(|| config.raw_auth_credential.clone())
            else {
                continue;
            };
            if let Some(id) = &response.id {
                prompt_ids.insert(id.clone());
            }
            credentials.insert(config.state_key(), serde_json::to_value(credential)?);
        }
        if prompt_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut emitted = vec![Event::new(ctx.invocation_id.clone(), agent.name())
            .with_branch(ctx.branch.clone())
            .with_actions(EventActions {
                state_delta: credentials.clone(),
                ..Default::default()
            })];

        let Some((prompt_index, to_resume)) = find_prompted_calls(&events[..user_index], &prompt_ids)? else {
            return Ok(emitted);
        };
        let Some(original) = events[..prompt_index]
            .iter()
            .rev()
            .find(|event| {
                event
                    .function_calls()
                    .iter()
                    .any(|call| call.id.as_ref().is_some_and(|id| to_resume.contains(id)))
            })
        else {
            return Ok(emitted);
        };

        tracing::debug!(
            invocation_id = %ctx.invocation_id,
            agent = %agent.name(),
            resumed = to_resume.len(),
            "resuming calls after credential hand-off"
        );
        let tools: ToolsDict = agent
            .canonical_tools()
            .into_iter()
            .map(|tool| (tool.name().to_string(), tool))
            .collect();
        if let Some(result) = handle_function_calls_with_state(
            ctx,
            agent,
            original,
            &tools,
            Some(&to_resume),
            credentials,
        )
        .await?
        {
            emitted.push(result);
        }
        Ok(emitted)
    }
}

/// Locate the credential prompt answered by `prompt_ids` and return its index
/// with the ids of the original calls it asked on behalf of.
fn find_prompted_calls(
    events: &[Event],
    prompt_ids: &HashSet<String>,
) -> Result<Option<(usize, HashSet<String>)>> {
    for (index, event) in events.iter().enumerate().rev() {
        let mut to_resume = HashSet::new();
        for call in event.function_calls() {
            if !call.id.as_ref().is_some_and(|id| prompt_ids.contains(id)) {
                continue;
            }
            let args: AuthToolArguments = serde_json::from_value(call.args.clone())?;
            to_resume.insert(args.function_call_id);
        }
        if !to_resume.is_empty() {
            return Ok(Some((index, to_resume)));
        }
    }
    Ok(None)
}

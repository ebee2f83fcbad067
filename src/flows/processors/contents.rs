//! Conversation history assembly.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;

use crate::agents::{BaseAgent, IncludeContents, InvocationContext, LlmAgent};
use crate::auth::REQUEST_CREDENTIAL_FUNCTION_CALL_NAME;
use crate::error::{KestrelError, Result};
use crate::events::{merge_function_response_events, Event};
use crate::flows::functions::remove_client_function_call_ids;
use crate::flows::RequestProcessor;
use crate::models::LlmRequest;
use crate::types::{Content, Part, Role};

/// Fills `request.contents` from the session transcript.
#[derive(Debug, Default)]
pub struct ContentsRequestProcessor;

#[async_trait]
impl RequestProcessor for ContentsRequestProcessor {
    fn name(&self) -> &'static str {
        "contents"
    }

    async fn process(
        &self,
        ctx: &InvocationContext,
        agent: &LlmAgent,
        request: &mut LlmRequest,
    ) -> Result<Vec<Event>> {
        let session = ctx.session.read().await;
        let events = match agent.include_contents() {
            IncludeContents::Default => &session.events[..],
            IncludeContents::None => {
                let start = session
                    .events
                    .iter()
                    .rposition(|event| event.is_from_user() && event.function_responses().is_empty())
                    .unwrap_or(0);
                &session.events[start..]
            }
        };
        request.contents = get_contents(ctx.branch.as_deref(), events, agent.name())?;
        Ok(Vec::new())
    }
}

/// Build model contents from transcript events, as seen by `agent_name`.
///
/// Events outside the branch, empty events and credential prompts are
/// skipped; other agents' turns are reframed as user-side context; function
/// responses are placed directly after the calls they answer.
pub fn get_contents(
    current_branch: Option<&str>,
    events: &[Event],
    agent_name: &str,
) -> Result<Vec<Content>> {
    let filtered: Vec<Event> = events
        .iter()
        .filter(|event| has_content(event))
        .filter(|event| belongs_to_branch(current_branch, event))
        .filter(|event| !is_auth_event(event))
        .map(|event| {
            if is_other_agent_reply(agent_name, event) {
                convert_foreign_event(event)
            } else {
                event.clone()
            }
        })
        .collect();

    let events = rearrange_latest_function_response(filtered)?;
    let events = rearrange_async_function_responses(events)?;

    Ok(events
        .into_iter()
        .filter_map(|event| event.response.content)
        .map(|mut content| {
            remove_client_function_call_ids(&mut content);
            content
        })
        .collect())
}

fn has_content(event: &Event) -> bool {
    event.content().is_some_and(|content| match content.parts.first() {
        None => false,
        Some(Part::Text { text, .. }) => !text.is_empty(),
        Some(_) => true,
    })
}

/// An event is visible when it has no branch or its branch is a prefix of
/// the current one.
fn belongs_to_branch(current_branch: Option<&str>, event: &Event) -> bool {
    match (current_branch, event.branch.as_deref()) {
        (Some(current), Some(branch)) => {
            current == branch || current.starts_with(&format!("{branch}."))
        }
        _ => true,
    }
}

fn is_auth_event(event: &Event) -> bool {
    event
        .function_calls()
        .iter()
        .any(|call| call.name == REQUEST_CREDENTIAL_FUNCTION_CALL_NAME)
        || event
            .function_responses()
            .iter()
            .any(|response| response.name == REQUEST_CREDENTIAL_FUNCTION_CALL_NAME)
}

fn is_other_agent_reply(agent_name: &str, event: &Event) -> bool {
    !agent_name.is_empty() && !event.is_from_user() && event.author != agent_name
}

/// Rewrite another agent's event as user-role context.
fn convert_foreign_event(event: &Event) -> Event {
    let Some(content) = event.content() else {
        return event.clone();
    };
    let author = &event.author;
    let mut parts = vec![Part::text("For context:")];
    for part in &content.parts {
        match part {
            Part::Text { thought: true, .. } => {}
            Part::Text { text, .. } => parts.push(Part::text(format!("[{author}] said: {text}"))),
            Part::FunctionCall(call) => parts.push(Part::text(format!(
                "[{author}] called tool `{}` with parameters: {}",
                call.name, call.args
            ))),
            Part::FunctionResponse(response) => parts.push(Part::text(format!(
                "[{author}] `{}` tool returned result: {}",
                response.name, response.response
            ))),
            other => parts.push(other.clone()),
        }
    }
    let mut converted = event.clone();
    converted.response.content = Some(Content::new(Role::User, parts));
    converted
}

fn call_ids(event: &Event) -> HashSet<String> {
    event
        .function_calls()
        .iter()
        .filter_map(|call| call.id.clone())
        .collect()
}

fn response_ids(event: &Event) -> HashSet<String> {
    event
        .function_responses()
        .iter()
        .filter_map(|response| response.id.clone())
        .collect()
}

/// When the latest event answers calls from further back, move the answers
/// (merged) directly after those calls and drop what came in between.
fn rearrange_latest_function_response(events: Vec<Event>) -> Result<Vec<Event>> {
    let Some(latest) = events.last() else {
        return Ok(events);
    };
    let answered = response_ids(latest);
    if answered.is_empty() {
        return Ok(events);
    }
    let len = events.len();
    if len >= 2 && !call_ids(&events[len - 2]).is_disjoint(&answered) {
        return Ok(events);
    }

    let call_index = events[..len - 1]
        .iter()
        .rposition(|event| !call_ids(event).is_disjoint(&answered))
        .ok_or_else(|| {
            KestrelError::InvalidState(format!(
                "no function call event found for function response ids {answered:?}"
            ))
        })?;
    let batch = call_ids(&events[call_index]);

    let mut events = events;
    let responses: Vec<Event> = events
        .drain(call_index + 1..)
        .filter(|event| !response_ids(event).is_disjoint(&batch))
        .collect();
    events.push(merge_function_response_events(responses)?);
    Ok(events)
}

/// Place every function response directly after its call, merging responses
/// that answer the same call event.
fn rearrange_async_function_responses(events: Vec<Event>) -> Result<Vec<Event>> {
    let mut response_index: HashMap<String, usize> = HashMap::new();
    for (index, event) in events.iter().enumerate() {
        for id in response_ids(event) {
            response_index.insert(id, index);
        }
    }

    let mut arranged = Vec::with_capacity(events.len());
    for event in &events {
        if !event.function_responses().is_empty() {
            continue;
        }
        let calls = event.function_calls();
        if calls.is_empty() {
            arranged.push(event.clone());
            continue;
        }
        arranged.push(event.clone());
        let indexes: BTreeSet<usize> = calls
            .iter()
            .filter_map(|call| call.id.as_ref())
            .filter_map(|id| response_index.get(id).copied())
            .collect();
        match indexes.len() {
            0 => {}
            1 => arranged.extend(indexes.iter().map(|&index| events[index].clone())),
            _ => arranged.push(merge_function_response_events(
                indexes.iter().map(|&index| events[index].clone()).collect(),
            )?),
        }
    }
    Ok(arranged)
}

//! Function-call dispatch.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use super::debug_enabled;
use crate::agents::{BaseAgent, InvocationContext, LlmAgent};
use crate::auth::{AuthToolArguments, REQUEST_CREDENTIAL_FUNCTION_CALL_NAME};
use crate::error::{KestrelError, Result};
use crate::events::{merge_function_response_events, Event};
use crate::sessions::StateMap;
use crate::tools::{validate_arguments, Tool, ToolArguments, ToolContext};
use crate::types::{Content, FunctionCall, FunctionResponse, Part, Role};

/// Prefix of call ids assigned by the engine rather than the model.
pub const CLIENT_FUNCTION_CALL_ID_PREFIX: &str = "kestrel-";

/// Tools available to the dispatcher, by name.
pub type ToolsDict = HashMap<String, Arc<dyn Tool>>;

pub fn generate_client_function_call_id() -> String {
    format!("{CLIENT_FUNCTION_CALL_ID_PREFIX}{}", Uuid::new_v4())
}

/// Give every function call without an id a client-assigned one.
pub fn populate_client_function_call_ids(content: &mut Content) {
    for part in &mut content.parts {
        if let Part::FunctionCall(call) = part {
            if call.id.as_deref().map_or(true, str::is_empty) {
                call.id = Some(generate_client_function_call_id());
            }
        }
    }
}

/// Drop client-assigned ids; the model never sees ids it did not produce.
pub fn remove_client_function_call_ids(content: &mut Content) {
    let is_client_id =
        |id: &Option<String>| id.as_deref().is_some_and(|id| id.starts_with(CLIENT_FUNCTION_CALL_ID_PREFIX));
    for part in &mut content.parts {
        match part {
            Part::FunctionCall(call) if is_client_id(&call.id) => call.id = None,
            Part::FunctionResponse(response) if is_client_id(&response.id) => response.id = None,
            _ => {}
        }
    }
}

/// Ids of calls that target long-running tools.
pub fn long_running_function_call_ids(
    calls: &[&FunctionCall],
    tools: &ToolsDict,
) -> BTreeSet<String> {
    calls
        .iter()
        .filter(|call| {
            tools
                .get(&call.name)
                .is_some_and(|tool| tool.is_long_running())
        })
        .filter_map(|call| call.id.clone())
        .collect()
}

/// Build the credential prompt for a dispatch result that requested auth.
///
/// One long-running `request_credential` call per requested config, each with
/// a fresh id, in the order the originating calls were emitted.
pub fn generate_auth_event(ctx: &InvocationContext, response_event: &Event) -> Result<Option<Event>> {
    let requested = &response_event.actions.requested_auth_configs;
    if requested.is_empty() {
        return Ok(None);
    }
    let mut call_ids: Vec<&String> = response_event
        .function_responses()
        .into_iter()
        .filter_map(|response| response.id.as_ref())
        .filter(|id| requested.contains_key(*id))
        .collect();
    // Calls that requested a credential without returning a result yet.
    let mut unanswered: Vec<&String> = requested
        .keys()
        .filter(|id| !call_ids.contains(id))
        .collect();
    unanswered.sort();
    call_ids.extend(unanswered);
    let pending = call_ids.into_iter().filter_map(|id| requested.get_key_value(id));

    let mut parts = Vec::with_capacity(requested.len());
    let mut long_running = BTreeSet::new();
    for (function_call_id, auth_config) in pending {
        let args = AuthToolArguments {
            function_call_id: function_call_id.clone(),
            auth_config: auth_config.clone(),
        };
        let id = generate_client_function_call_id();
        long_running.insert(id.clone());
        parts.push(Part::FunctionCall(
            FunctionCall::new(REQUEST_CREDENTIAL_FUNCTION_CALL_NAME, serde_json::to_value(args)?)
                .with_id(id),
        ));
    }

    let mut event = Event::new(ctx.invocation_id.clone(), ctx.agent_name())
        .with_content(Content::new(Role::Model, parts))
        .with_branch(ctx.branch.clone());
    event.long_running_tool_ids = Some(long_running);
    Ok(Some(event))
}

/// Run every function call of `event` and merge the results into one event.
///
/// Calls run sequentially in emission order. Each call's context sees the
/// session state plus the writes of earlier calls in the batch. `filter`
/// restricts dispatch to the listed call ids. Returns `None` when no call
/// produced a result.
pub async fn handle_function_calls(
    ctx: &InvocationContext,
    agent: &LlmAgent,
    event: &Event,
    tools: &ToolsDict,
    filter: Option<&HashSet<String>>,
) -> Result<Option<Event>> {
    handle_function_calls_with_state(ctx, agent, event, tools, filter, StateMap::new()).await
}

/// [`handle_function_calls`] with `overlay` layered over the session state
/// every call sees, for state that is not yet applied to the session.
pub async fn handle_function_calls_with_state(
    ctx: &InvocationContext,
    agent: &LlmAgent,
    event: &Event,
    tools: &ToolsDict,
    filter: Option<&HashSet<String>>,
    overlay: StateMap,
) -> Result<Option<Event>> {
    let calls = event.function_calls();
    if calls.is_empty() {
        return Ok(None);
    }
    let mut session_state = ctx.session_state().await;
    session_state.extend(overlay);
    let mut batch_delta = StateMap::new();
    let mut response_events = Vec::with_capacity(calls.len());

    for call in calls {
        if let Some(allowed) = filter {
            if !call.id.as_ref().is_some_and(|id| allowed.contains(id)) {
                continue;
            }
        }
        let tool = tools
            .get(&call.name)
            .ok_or_else(|| KestrelError::ToolNotFound(call.name.clone()))?;

        let mut state = session_state.clone();
        state.extend(batch_delta.clone());
        let tool_ctx = ToolContext::new(ctx.clone(), state, call.id.clone(), event.actions.clone());

        let Some(result) = call_tool(agent, tool.as_ref(), call, &tool_ctx).await else {
            tracing::debug!(
                invocation_id = %ctx.invocation_id,
                tool = %call.name,
                function_call_id = ?call.id,
                "long-running tool returned no result yet"
            );
            continue;
        };

        let actions = tool_ctx.actions();
        batch_delta.extend(actions.state_delta.clone());
        let response = FunctionResponse {
            id: call.id.clone(),
            name: call.name.clone(),
            response: wrap_result(result),
        };
        response_events.push(
            Event::new(ctx.invocation_id.clone(), agent.name())
                .with_content(Content::new(Role::User, vec![Part::FunctionResponse(response)]))
                .with_branch(ctx.branch.clone())
                .with_actions(actions),
        );
    }

    if response_events.is_empty() {
        return Ok(None);
    }
    let merged = merge_function_response_events(response_events)?;
    if debug_enabled() {
        tracing::debug!(
            invocation_id = %ctx.invocation_id,
            agent = %agent.name(),
            responses = merged.function_responses().len(),
            transfer = ?merged.actions.transfer_to_agent,
            "function calls dispatched"
        );
    }
    Ok(Some(merged))
}

/// Before-callbacks, validation, the tool itself, then after-callbacks.
/// `None` means a long-running tool has no result yet.
async fn call_tool(
    agent: &LlmAgent,
    tool: &dyn Tool,
    call: &FunctionCall,
    ctx: &ToolContext,
) -> Option<Value> {
    let mut args = call.args.clone();
    let mut result = agent
        .before_tool_callbacks()
        .iter()
        .find_map(|callback| callback(tool, &mut args, ctx));

    if result.is_none() {
        result = run_tool(tool, args.clone(), ctx).await;
    }

    let returned = result.clone().unwrap_or(Value::Null);
    if let Some(replaced) = agent
        .after_tool_callbacks()
        .iter()
        .find_map(|callback| callback(tool, &args, ctx, &returned))
    {
        result = Some(replaced);
    }

    match result {
        None if tool.is_long_running() => None,
        other => Some(other.unwrap_or(Value::Null)),
    }
}

async fn run_tool(tool: &dyn Tool, args: Value, ctx: &ToolContext) -> Option<Value> {
    let args = ToolArguments::new(args);
    if let Some(declaration) = tool.declaration() {
        if let Err(violations) = validate_arguments(args.raw(), &declaration.parameters) {
            tracing::warn!(tool = %tool.name(), ?violations, "tool arguments rejected");
            return Some(json!({
                "error": format!("Argument validation failed: {}", violations.join("; ")),
            }));
        }
    }
    match tool.run(&args, ctx).await {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(tool = %tool.name(), error = %err, "tool execution failed");
            Some(json!({ "error": err.to_string() }))
        }
    }
}

/// Function responses are objects; anything else is wrapped as `{"result": v}`.
fn wrap_result(result: Value) -> Value {
    match result {
        Value::Object(_) => result,
        other => json!({ "result": other }),
    }
}

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::agents::{Instruction, InvocationContext, LlmAgent, ReadonlyContext};
use crate::error::{KestrelError, Result};
use crate::events::Event;
use crate::flows::RequestProcessor;
use crate::models::LlmRequest;
use crate::sessions::StateMap;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{+[^{}]*\}+").expect("placeholder regex is valid"));

const ARTIFACT_PREFIX: &str = "artifact.";

/// Global instruction (from the root agent) then the agent's own instruction.
#[derive(Debug, Default)]
pub struct InstructionsRequestProcessor;

#[async_trait]
impl RequestProcessor for InstructionsRequestProcessor {
    fn name(&self) -> &'static str {
        "instructions"
    }

    async fn process(
        &self,
        ctx: &InvocationContext,
        agent: &LlmAgent,
        request: &mut LlmRequest,
    ) -> Result<Vec<Event>> {
        let state = ctx.session_state().await;
        let readonly = ReadonlyContext::new(ctx, &state);

        let global = ctx
            .root_agent
            .as_llm_agent()
            .and_then(LlmAgent::global_instruction);
        for instruction in [global, agent.instruction()].into_iter().flatten() {
            let text = render(instruction, &readonly, &state)?;
            request.append_instructions(&[text]);
        }
        Ok(Vec::new())
    }
}

fn render(instruction: &Instruction, ctx: &ReadonlyContext<'_>, state: &StateMap) -> Result<String> {
    match instruction.resolve(ctx) {
        (text, true) => Ok(text),
        (template, false) => inject_session_state(&template, state),
    }
}

/// Substitute `{key}` placeholders with values from `state`.
///
/// `{key?}` renders empty when the key is missing; a missing required key is
/// an error. `{artifact.name}` and braces around anything that is not an
/// identifier are left as written. String values render without quotes,
/// other values as JSON.
pub fn inject_session_state(template: &str, state: &StateMap) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for placeholder in PLACEHOLDER.find_iter(template) {
        rendered.push_str(&template[last..placeholder.start()]);
        rendered.push_str(&replacement(placeholder.as_str(), state)?);
        last = placeholder.end();
    }
    rendered.push_str(&template[last..]);
    Ok(rendered)
}

fn replacement(raw: &str, state: &StateMap) -> Result<String> {
    let name = raw.trim_start_matches('{').trim_end_matches('}').trim();
    let (name, optional) = match name.strip_suffix('?') {
        Some(name) => (name, true),
        None => (name, false),
    };
    if name.starts_with(ARTIFACT_PREFIX) || !is_identifier(name) {
        return Ok(raw.to_string());
    }
    match state.get(name) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(value) => Ok(value.to_string()),
        None if optional => Ok(String::new()),
        None => Err(KestrelError::MissingContextVariable(name.to_string())),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

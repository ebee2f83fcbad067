//! Agent driven by a language model.

use std::fmt;
use std::sync::Arc;

use bon::Builder;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::base_agent::{find_parent, BaseAgent, EventStream, ToolCapableAgent};
use super::callback_context::ReadonlyContext;
use super::callbacks::{
    AfterModelCallback, AfterToolCallback, BeforeModelCallback, BeforeToolCallback,
};
use super::invocation_context::InvocationContext;
use crate::code_executors::CodeExecutor;
use crate::error::{KestrelError, Result};
use crate::events::Event;
use crate::flows::LlmFlow;
use crate::models::Llm;
use crate::planners::Planner;
use crate::tools::Tool;
use crate::types::{Content, GenerateContentConfig};

/// Computes instruction text from the current context.
pub type InstructionProvider = Arc<dyn Fn(&ReadonlyContext<'_>) -> String + Send + Sync>;

/// Static instruction text (with `{key}` placeholders) or a provider.
///
/// Provider output is used verbatim; placeholders are only substituted in
/// static text.
#[derive(Clone)]
pub enum Instruction {
    Text(String),
    Provider(InstructionProvider),
}

impl Instruction {
    pub fn provider(f: impl Fn(&ReadonlyContext<'_>) -> String + Send + Sync + 'static) -> Self {
        Self::Provider(Arc::new(f))
    }

    /// Resolve the text. The flag is true when placeholder substitution
    /// must be skipped.
    pub fn resolve(&self, ctx: &ReadonlyContext<'_>) -> (String, bool) {
        match self {
            Self::Text(text) => (text.clone(), false),
            Self::Provider(provider) => (provider(ctx), true),
        }
    }
}

impl From<&str> for Instruction {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Instruction {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// How much of the session history the model sees.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncludeContents {
    /// Full branch-visible history.
    #[default]
    Default,
    /// Only the current turn, starting at the latest user message.
    None,
}

/// An agent whose turns are produced by a model, tools and sub-agents.
#[derive(Builder)]
pub struct LlmAgent {
    #[builder(into)]
    name: String,
    #[builder(into, default)]
    description: String,
    /// Inherited from the nearest ancestor when unset.
    model: Option<Arc<dyn Llm>>,
    #[builder(into)]
    instruction: Option<Instruction>,
    /// Only read from the root agent; applies to the whole tree.
    #[builder(into)]
    global_instruction: Option<Instruction>,
    #[builder(default)]
    tools: Vec<Arc<dyn Tool>>,
    #[builder(default)]
    sub_agents: Vec<Arc<dyn BaseAgent>>,
    #[builder(default)]
    generate_content_config: GenerateContentConfig,
    /// JSON schema the final answer must match.
    output_schema: Option<serde_json::Value>,
    /// State key receiving the text of the final response.
    #[builder(into)]
    output_key: Option<String>,
    planner: Option<Arc<dyn Planner>>,
    code_executor: Option<Arc<dyn CodeExecutor>>,
    #[builder(default)]
    include_contents: IncludeContents,
    #[builder(default)]
    disallow_transfer_to_parent: bool,
    #[builder(default)]
    disallow_transfer_to_peers: bool,
    #[builder(default)]
    before_model_callbacks: Vec<BeforeModelCallback>,
    #[builder(default)]
    after_model_callbacks: Vec<AfterModelCallback>,
    #[builder(default)]
    before_tool_callbacks: Vec<BeforeToolCallback>,
    #[builder(default)]
    after_tool_callbacks: Vec<AfterToolCallback>,
}

impl fmt::Debug for LlmAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmAgent")
            .field("name", &self.name)
            .field("model", &self.model.as_ref().map(|m| m.model().to_string()))
            .field("tools", &self.tools.iter().map(|t| t.name().to_string()).collect::<Vec<_>>())
            .field(
                "sub_agents",
                &self.sub_agents.iter().map(|a| a.name().to_string()).collect::<Vec<_>>(),
            )
            .field("output_key", &self.output_key)
            .finish_non_exhaustive()
    }
}

impl LlmAgent {
    pub fn instruction(&self) -> Option<&Instruction> {
        self.instruction.as_ref()
    }

    pub fn global_instruction(&self) -> Option<&Instruction> {
        self.global_instruction.as_ref()
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn generate_content_config(&self) -> &GenerateContentConfig {
        &self.generate_content_config
    }

    pub fn output_schema(&self) -> Option<&serde_json::Value> {
        self.output_schema.as_ref()
    }

    pub fn output_key(&self) -> Option<&str> {
        self.output_key.as_deref()
    }

    pub fn planner(&self) -> Option<&Arc<dyn Planner>> {
        self.planner.as_ref()
    }

    pub fn code_executor(&self) -> Option<&Arc<dyn CodeExecutor>> {
        self.code_executor.as_ref()
    }

    pub fn include_contents(&self) -> IncludeContents {
        self.include_contents
    }

    pub fn disallow_transfer_to_parent(&self) -> bool {
        self.disallow_transfer_to_parent
    }

    pub fn disallow_transfer_to_peers(&self) -> bool {
        self.disallow_transfer_to_peers
    }

    pub fn before_model_callbacks(&self) -> &[BeforeModelCallback] {
        &self.before_model_callbacks
    }

    pub fn after_model_callbacks(&self) -> &[AfterModelCallback] {
        &self.after_model_callbacks
    }

    pub fn before_tool_callbacks(&self) -> &[BeforeToolCallback] {
        &self.before_tool_callbacks
    }

    pub fn after_tool_callbacks(&self) -> &[AfterToolCallback] {
        &self.after_tool_callbacks
    }

    /// The model this agent calls: its own, else the nearest ancestor's.
    pub fn canonical_model(&self, ctx: &InvocationContext) -> Result<Arc<dyn Llm>> {
        if let Some(model) = &self.model {
            return Ok(Arc::clone(model));
        }
        let mut name = self.name.clone();
        while let Some(parent) = find_parent(&ctx.root_agent, &name) {
            if let Some(model) = parent.as_llm_agent().and_then(|agent| agent.model.clone()) {
                return Ok(model);
            }
            name = parent.name().to_string();
        }
        Err(KestrelError::Configuration(format!(
            "no model found for agent `{}`",
            self.name
        )))
    }

    /// Record the text of this agent's final response under `output_key`.
    ///
    /// With an output schema the text is stored as parsed JSON.
    fn save_output_to_state(&self, event: &mut Event) {
        let Some(key) = &self.output_key else {
            return;
        };
        if event.author != self.name || !event.is_final_response() || event.response.is_error() {
            return;
        }
        let Some(text) = event.content().map(Content::text) else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }
        let value = match self.output_schema {
            Some(_) => serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)),
            None => serde_json::Value::String(text),
        };
        event.actions.state_delta.insert(key.clone(), value);
    }

    /// Whether this agent may hand the conversation to another agent at all.
    pub fn can_transfer(&self) -> bool {
        !(self.disallow_transfer_to_parent
            && self.disallow_transfer_to_peers
            && self.sub_agents.is_empty())
    }

    /// The flow driving this agent: transfer-capable unless it has nowhere to go.
    pub fn flow(&self) -> LlmFlow {
        if self.can_transfer() {
            LlmFlow::auto()
        } else {
            LlmFlow::single()
        }
    }
}

impl ToolCapableAgent for LlmAgent {
    fn canonical_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.clone()
    }
}

impl BaseAgent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn sub_agents(&self) -> &[Arc<dyn BaseAgent>] {
        &self.sub_agents
    }

    fn run_async(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        let events = Arc::new(self.flow()).run_async(ctx, Arc::clone(&self));
        Box::pin(events.map(move |event| {
            event.map(|mut event| {
                self.save_output_to_state(&mut event);
                event
            })
        }))
    }

    fn as_llm_agent(&self) -> Option<&LlmAgent> {
        Some(self)
    }

    fn as_tool_capable(&self) -> Option<&dyn ToolCapableAgent> {
        Some(self)
    }
}

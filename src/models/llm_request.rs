//! Request assembled by the request pipeline for one model call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::tools::Tool;
use crate::types::{Content, GenerateContentConfig};

/// A model request under construction.
///
/// Built fresh for every step, mutated only by request-pipeline stages and
/// tool hooks, then handed to [`Llm::generate_content`](super::Llm::generate_content).
#[derive(Clone, Default)]
pub struct LlmRequest {
    pub model: Option<String>,
    pub contents: Vec<Content>,
    pub config: GenerateContentConfig,
    /// Tools declared on this request, by name.
    pub tools_dict: HashMap<String, Arc<dyn Tool>>,
}

impl fmt::Debug for LlmRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tool_names: Vec<&str> = self.tools_dict.keys().map(String::as_str).collect();
        tool_names.sort_unstable();
        f.debug_struct("LlmRequest")
            .field("model", &self.model)
            .field("contents", &self.contents)
            .field("config", &self.config)
            .field("tools_dict", &tool_names)
            .finish()
    }
}

impl LlmRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append instruction blocks to the system instruction, separated by a blank line.
    pub fn append_instructions<S: AsRef<str>>(&mut self, instructions: &[S]) {
        let appended = instructions
            .iter()
            .map(AsRef::as_ref)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if appended.is_empty() {
            return;
        }
        match self.config.system_instruction.as_mut() {
            Some(existing) if !existing.is_empty() => {
                existing.push_str("\n\n");
                existing.push_str(&appended);
            }
            _ => self.config.system_instruction = Some(appended),
        }
    }

    /// Declare tools on the request and register them for dispatch.
    pub fn append_tools(&mut self, tools: &[Arc<dyn Tool>]) {
        for tool in tools {
            let Some(declaration) = tool.declaration() else {
                continue;
            };
            self.config.tools.push(declaration);
            self.tools_dict
                .insert(tool.name().to_string(), Arc::clone(tool));
        }
    }

    /// Ask the model for JSON output matching `schema`.
    pub fn set_output_schema(&mut self, schema: serde_json::Value) {
        self.config.response_schema = Some(schema);
        self.config.response_mime_type = Some("application/json".to_string());
    }

    pub fn system_instruction(&self) -> &str {
        self.config.system_instruction.as_deref().unwrap_or_default()
    }
}

use async_trait::async_trait;
use serde_json::Value;

use crate::agents::{BaseAgent, InvocationContext, LlmAgent};
use crate::error::Result;
use crate::events::Event;
use crate::flows::ResponseProcessor;
use crate::models::LlmResponse;
use crate::tools::validate_arguments;
use crate::types::{Content, Part};

/// Error code set on responses whose text does not match the output schema.
pub const OUTPUT_SCHEMA_VALIDATION_FAILED: &str = "OUTPUT_SCHEMA_VALIDATION_FAILED";

/// Validates final text against the agent's output schema.
///
/// Valid output is rewritten to its canonical JSON serialization. Invalid
/// output replaces the response with an error-coded one and emits a
/// diagnostic event; the loop continues normally.
#[derive(Debug, Default)]
pub struct OutputSchemaResponseProcessor;

#[async_trait]
impl ResponseProcessor for OutputSchemaResponseProcessor {
    fn name(&self) -> &'static str {
        "output_schema"
    }

    async fn process(
        &self,
        ctx: &InvocationContext,
        agent: &LlmAgent,
        response: &mut LlmResponse,
    ) -> Result<Vec<Event>> {
        let Some(schema) = agent.output_schema() else {
            return Ok(Vec::new());
        };
        if response.partial || response.is_error() {
            return Ok(Vec::new());
        }
        let Some(content) = response.content.as_mut() else {
            return Ok(Vec::new());
        };
        if !content.function_calls().is_empty() {
            return Ok(Vec::new());
        }
        let text = content.text();
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let problem = match serde_json::from_str::<Value>(text.trim()) {
            Err(err) => format!("response is not valid JSON: {err}"),
            Ok(value) => match validate_arguments(&value, schema) {
                Ok(()) => {
                    let canonical = serde_json::to_string(&value)?;
                    content.parts.retain(Part::is_thought);
                    content.parts.push(Part::text(canonical));
                    return Ok(Vec::new());
                }
                Err(violations) => violations.join("; "),
            },
        };

        tracing::warn!(
            invocation_id = %ctx.invocation_id,
            agent = %agent.name(),
            %problem,
            "output schema validation failed"
        );
        let usage = response.usage_metadata.take();
        *response = LlmResponse::error(OUTPUT_SCHEMA_VALIDATION_FAILED, problem.clone());
        response.usage_metadata = usage;

        let mut diagnostic = Event::new(ctx.invocation_id.clone(), agent.name())
            .with_content(Content::model(format!(
                "The response did not match the required output schema: {problem}"
            )))
            .with_branch(ctx.branch.clone());
        diagnostic.response.error_code = Some(OUTPUT_SCHEMA_VALIDATION_FAILED.to_string());
        Ok(vec![diagnostic])
    }
}

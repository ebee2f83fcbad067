use async_trait::async_trait;

use crate::agents::{InvocationContext, LlmAgent};
use crate::error::Result;
use crate::events::Event;
use crate::flows::RequestProcessor;
use crate::models::LlmRequest;

/// Model name, generation config and output schema.
#[derive(Debug, Default)]
pub struct BasicRequestProcessor;

#[async_trait]
impl RequestProcessor for BasicRequestProcessor {
    fn name(&self) -> &'static str {
        "basic"
    }

    async fn process(
        &self,
        ctx: &InvocationContext,
        agent: &LlmAgent,
        request: &mut LlmRequest,
    ) -> Result<Vec<Event>> {
        let model = agent.canonical_model(ctx)?;
        request.model = Some(model.model().to_string());
        request.config = agent.generate_content_config().clone();
        if let Some(schema) = agent.output_schema() {
            request.set_output_schema(schema.clone());
        }
        Ok(Vec::new())
    }
}

use async_trait::async_trait;

use crate::agents::{BaseAgent, InvocationContext, LlmAgent};
use crate::code_executors::{
    convert_code_execution_parts, extract_code_and_truncate_content, CodeExecutionInput,
};
use crate::error::Result;
use crate::events::Event;
use crate::flows::{RequestProcessor, ResponseProcessor};
use crate::models::{LlmRequest, LlmResponse};
use crate::types::{Content, Role};

/// Lets the executor adjust the request and renders past code parts as text.
#[derive(Debug, Default)]
pub struct CodeExecutionRequestProcessor;

#[async_trait]
impl RequestProcessor for CodeExecutionRequestProcessor {
    fn name(&self) -> &'static str {
        "code_execution"
    }

    async fn process(
        &self,
        _ctx: &InvocationContext,
        agent: &LlmAgent,
        request: &mut LlmRequest,
    ) -> Result<Vec<Event>> {
        let Some(executor) = agent.code_executor() else {
            return Ok(Vec::new());
        };
        executor.process_llm_request(request);

        let code_delimiter = executor
            .code_block_delimiters()
            .into_iter()
            .next()
            .unwrap_or_default();
        let result_delimiters = executor.execution_result_delimiters();
        for content in &mut request.contents {
            convert_code_execution_parts(content, &code_delimiter, &result_delimiters);
        }
        Ok(Vec::new())
    }
}

/// Runs the first code block of a complete response.
///
/// Emits the code as its own event, then the execution result. The response
/// itself is cleared; the trailing result keeps the loop going so the model
/// sees the output.
#[derive(Debug, Default)]
pub struct CodeExecutionResponseProcessor;

#[async_trait]
impl ResponseProcessor for CodeExecutionResponseProcessor {
    fn name(&self) -> &'static str {
        "code_execution"
    }

    async fn process(
        &self,
        ctx: &InvocationContext,
        agent: &LlmAgent,
        response: &mut LlmResponse,
    ) -> Result<Vec<Event>> {
        let Some(executor) = agent.code_executor() else {
            return Ok(Vec::new());
        };
        if response.partial {
            return Ok(Vec::new());
        }
        let Some(mut content) = response.content.clone() else {
            return Ok(Vec::new());
        };
        let Some(code) =
            extract_code_and_truncate_content(&mut content, &executor.code_block_delimiters())
        else {
            return Ok(Vec::new());
        };

        let code_event = Event::new(ctx.invocation_id.clone(), agent.name())
            .with_content(content)
            .with_branch(ctx.branch.clone());
        let output = executor
            .execute_code(
                ctx,
                CodeExecutionInput {
                    code,
                    language: "python".into(),
                },
            )
            .await?;
        tracing::debug!(
            invocation_id = %ctx.invocation_id,
            agent = %agent.name(),
            failed = !output.stderr.is_empty(),
            "code executed"
        );
        let result_event = Event::new(ctx.invocation_id.clone(), agent.name())
            .with_content(Content::new(Role::Model, vec![output.to_result_part()]))
            .with_branch(ctx.branch.clone());

        response.content = None;
        Ok(vec![code_event, result_event])
    }
}

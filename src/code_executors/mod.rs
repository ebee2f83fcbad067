//! Code execution boundary.
//!
//! The engine never runs code itself. It finds code blocks in model text,
//! hands them to a [`CodeExecutor`] and feeds the output back to the model.

use async_trait::async_trait;

use crate::agents::InvocationContext;
use crate::error::Result;
use crate::models::LlmRequest;
use crate::types::{CodeExecutionOutcome, CodeExecutionResult, Content, ExecutableCode, Part};

/// Code extracted from a model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeExecutionInput {
    pub code: String,
    pub language: String,
}

/// What running the code printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeExecutionOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CodeExecutionOutput {
    /// Result part recorded in the transcript. Any stderr marks the run failed.
    pub fn to_result_part(&self) -> Part {
        if self.stderr.is_empty() {
            Part::CodeExecutionResult(CodeExecutionResult {
                outcome: CodeExecutionOutcome::Ok,
                output: format!("Code execution result:\n{}\n", self.stdout),
            })
        } else {
            Part::CodeExecutionResult(CodeExecutionResult {
                outcome: CodeExecutionOutcome::Failed,
                output: format!("Failed to get code execution result:\n{}\n", self.stderr),
            })
        }
    }
}

/// A sandbox able to run code blocks written by the model.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// `(leading, trailing)` pairs marking code blocks in model text.
    fn code_block_delimiters(&self) -> Vec<(String, String)> {
        vec![
            ("```tool_code\n".into(), "\n```".into()),
            ("```python\n".into(), "\n```".into()),
        ]
    }

    /// `(leading, trailing)` wrapping execution output shown to the model.
    fn execution_result_delimiters(&self) -> (String, String) {
        ("```tool_output\n".into(), "\n```".into())
    }

    /// Adjust the request before the model call.
    fn process_llm_request(&self, _request: &mut LlmRequest) {}

    async fn execute_code(
        &self,
        ctx: &InvocationContext,
        input: CodeExecutionInput,
    ) -> Result<CodeExecutionOutput>;
}

/// Pull the first delimited code block out of `content`.
///
/// On a match, `content` is rewritten to the text before the block followed
/// by an executable-code part, and the code is returned. An existing
/// executable-code part is used as is, with later parts dropped.
pub fn extract_code_and_truncate_content(
    content: &mut Content,
    delimiters: &[(String, String)],
) -> Option<String> {
    if let Some(index) = content
        .parts
        .iter()
        .position(|part| matches!(part, Part::ExecutableCode(_)))
    {
        content.parts.truncate(index + 1);
        if let Some(Part::ExecutableCode(code)) = content.parts.last() {
            return Some(code.code.clone());
        }
    }

    let text = content
        .parts
        .iter()
        .filter(|part| !part.is_thought())
        .filter_map(Part::as_text)
        .collect::<Vec<_>>()
        .join("\n");

    let (start, leading, trailing) = delimiters
        .iter()
        .filter_map(|(leading, trailing)| {
            text.find(leading.as_str())
                .map(|start| (start, leading, trailing))
        })
        .min_by_key(|(start, ..)| *start)?;
    let code_start = start + leading.len();
    let code_len = text[code_start..].find(trailing.as_str())?;
    let code = text[code_start..code_start + code_len].to_string();
    let prefix = text[..start].to_string();

    let thoughts: Vec<Part> = content
        .parts
        .drain(..)
        .filter(Part::is_thought)
        .collect();
    content.parts = thoughts;
    if !prefix.is_empty() {
        content.parts.push(Part::text(prefix));
    }
    content.parts.push(Part::ExecutableCode(ExecutableCode {
        language: "python".into(),
        code: code.clone(),
    }));
    Some(code)
}

/// Render a trailing code or code-result part as delimited text, so models
/// without native code parts can read the history.
pub fn convert_code_execution_parts(
    content: &mut Content,
    code_block_delimiter: &(String, String),
    result_delimiters: &(String, String),
) {
    let Some(last) = content.parts.last_mut() else {
        return;
    };
    match last {
        Part::ExecutableCode(code) => {
            *last = Part::text(format!(
                "{}{}{}",
                code_block_delimiter.0, code.code, code_block_delimiter.1
            ));
        }
        Part::CodeExecutionResult(result) => {
            *last = Part::text(format!(
                "{}{}{}",
                result_delimiters.0, result.output, result_delimiters.1
            ));
        }
        _ => {}
    }
}

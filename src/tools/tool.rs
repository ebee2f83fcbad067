//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::arguments::ToolArguments;
use super::context::ToolContext;
use super::types::ToolParameters;
use crate::agents::InvocationContext;
use crate::error::Result;
use crate::models::LlmRequest;
use crate::types::FunctionDeclaration;

/// A capability the model can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls the tool by.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Whether results may arrive in a later turn.
    ///
    /// A long-running tool that returns `None` produces no function response
    /// now; the call id is reported on the event instead.
    fn is_long_running(&self) -> bool {
        false
    }

    /// Declaration sent to the model. Tools returning `None` are not declared
    /// and cannot be called.
    fn declaration(&self) -> Option<FunctionDeclaration>;

    /// Run the tool.
    async fn run(&self, args: &ToolArguments, ctx: &ToolContext) -> Result<Option<Value>>;

    /// Request-level setup beyond the declaration, run once per step after
    /// the request pipeline.
    async fn process_llm_request(
        &self,
        _ctx: &InvocationContext,
        _request: &mut LlmRequest,
    ) -> Result<()> {
        Ok(())
    }
}

type ToolHandler = dyn Fn(ToolArguments, ToolContext) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>>
    + Send
    + Sync;

/// Closure-based tool.
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: ToolParameters,
    long_running: bool,
    handler: Arc<ToolHandler>,
}

impl FunctionTool {
    /// Create a tool from an async closure.
    ///
    /// The closure receives a clone of the call's [`ToolContext`]; state
    /// writes and actions made through it land on the function response event.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            long_running: false,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }

    /// Mark the tool long-running. A `null` return then means "no result yet".
    pub fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }

    pub fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_long_running(&self) -> bool {
        self.long_running
    }

    fn declaration(&self) -> Option<FunctionDeclaration> {
        Some(FunctionDeclaration {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.schema.clone(),
        })
    }

    async fn run(&self, args: &ToolArguments, ctx: &ToolContext) -> Result<Option<Value>> {
        let value = (self.handler)(args.clone(), ctx.clone()).await?;
        Ok(match value {
            Value::Null if self.long_running => None,
            value => Some(value),
        })
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("long_running", &self.long_running)
            .finish()
    }
}

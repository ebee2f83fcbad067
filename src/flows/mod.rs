//! The invocation loop and its request/response pipelines.

pub mod functions;
mod llm_flow;
pub mod processors;

pub use llm_flow::LlmFlow;

use async_trait::async_trait;

use crate::agents::{InvocationContext, LlmAgent};
use crate::error::Result;
use crate::events::Event;
use crate::models::{LlmRequest, LlmResponse};

/// A request-pipeline stage.
///
/// Returned events are emitted, in order, before the next stage runs.
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(
        &self,
        ctx: &InvocationContext,
        agent: &LlmAgent,
        request: &mut LlmRequest,
    ) -> Result<Vec<Event>>;
}

/// A response-pipeline stage, run on every response before it is finalized.
///
/// Returned events are emitted ahead of the finalized response event.
#[async_trait]
pub trait ResponseProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(
        &self,
        ctx: &InvocationContext,
        agent: &LlmAgent,
        response: &mut LlmResponse,
    ) -> Result<Vec<Event>>;
}

/// Whether verbose per-step traces are enabled (`KESTREL_DEBUG=1`).
pub fn debug_enabled() -> bool {
    matches!(std::env::var("KESTREL_DEBUG").as_deref(), Ok("1"))
}

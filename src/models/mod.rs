//! Model boundary: request/response types and the [`Llm`] trait.

pub mod llm_request;
pub mod llm_response;

pub use llm_request::LlmRequest;
pub use llm_response::LlmResponse;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::KestrelError;

/// Stream of responses for one model call.
pub type LlmResponseStream = BoxStream<'static, Result<LlmResponse, KestrelError>>;

/// Vendor-independent language model client.
///
/// Non-streaming calls yield exactly one response. Streaming calls yield any
/// number of `partial` responses followed by one non-partial response.
#[async_trait]
pub trait Llm: Send + Sync {
    /// Model identifier (e.g. `"gemini-2.0-flash"`).
    fn model(&self) -> &str;

    /// Generate content for `request`.
    async fn generate_content(
        &self,
        request: &LlmRequest,
        stream: bool,
    ) -> Result<LlmResponseStream, KestrelError>;
}

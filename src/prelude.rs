//! Convenience re-exports for common use.

pub use crate::agents::{BaseAgent, CallbackContext, InvocationContext, LlmAgent};
pub use crate::config::{EngineConfig, RunConfig};
pub use crate::error::{KestrelError, Result};
pub use crate::events::{Event, EventActions};
pub use crate::models::{Llm, LlmRequest, LlmResponse};
pub use crate::runner::Runner;
pub use crate::sessions::{InMemorySessionService, SessionService};
pub use crate::tools::{FunctionTool, Tool, ToolArguments, ToolContext, ToolParameters};
pub use crate::types::{Content, GenerateContentConfig, Part, Role, StreamingMode};

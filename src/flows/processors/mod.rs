//! Request- and response-pipeline stages.

mod agent_transfer;
mod basic;
mod code_execution;
mod contents;
mod identity;
mod instructions;
mod nl_planning;
mod output_schema;

pub use agent_transfer::AgentTransferRequestProcessor;
pub use basic::BasicRequestProcessor;
pub use code_execution::{CodeExecutionRequestProcessor, CodeExecutionResponseProcessor};
pub use contents::{get_contents, ContentsRequestProcessor};
pub use identity::IdentityRequestProcessor;
pub use instructions::{inject_session_state, InstructionsRequestProcessor};
pub use nl_planning::{NlPlanningRequestProcessor, NlPlanningResponseProcessor};
pub use output_schema::{OutputSchemaResponseProcessor, OUTPUT_SCHEMA_VALIDATION_FAILED};

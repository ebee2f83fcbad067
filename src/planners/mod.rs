//! Planners: instruction-level strategies that shape how the model reasons.

mod plan_react;

pub use plan_react::PlanReActPlanner;

use crate::agents::{CallbackContext, ReadonlyContext};
use crate::models::LlmRequest;
use crate::types::Part;

/// Adds planning instructions to requests and post-processes responses.
pub trait Planner: Send + Sync {
    /// Instruction text appended to the system instruction, if any.
    fn build_planning_instruction(
        &self,
        ctx: &ReadonlyContext<'_>,
        request: &LlmRequest,
    ) -> Option<String>;

    /// Rewrite response parts, e.g. marking reasoning as thought.
    /// `None` leaves the parts unchanged.
    fn process_planning_response(
        &self,
        ctx: &CallbackContext,
        parts: &[Part],
    ) -> Option<Vec<Part>>;
}

use crate::agents::{CallbackContext, ReadonlyContext};
use crate::models::LlmRequest;
use crate::types::Part;

use super::Planner;

pub const PLANNING_TAG: &str = "/*PLANNING*/";
pub const REPLANNING_TAG: &str = "/*REPLANNING*/";
pub const REASONING_TAG: &str = "/*REASONING*/";
pub const ACTION_TAG: &str = "/*ACTION*/";
pub const FINAL_ANSWER_TAG: &str = "/*FINAL_ANSWER*/";

/// Plan, act, reason, then answer, using tagged sections in plain text.
///
/// Everything before the final-answer tag is marked as thought so it is
/// excluded from the answer text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanReActPlanner;

impl PlanReActPlanner {
    pub fn new() -> Self {
        Self
    }

    fn instruction() -> String {
        format!(
            "When answering, first write a plan under {PLANNING_TAG}: the ordered steps and \
             the tools each step needs. Then carry the plan out. Write tool-related notes under \
             {ACTION_TAG} and your reasoning about intermediate results under {REASONING_TAG}. \
             If the plan turns out not to work, write a new one under {REPLANNING_TAG} and \
             continue with it. Finish with the answer to the user under {FINAL_ANSWER_TAG}.\n\n\
             Rely on tool results rather than assumptions. Keep the plan short and only include \
             steps that are needed. If the question cannot be answered with the available tools, \
             ask the user for clarification in the final answer."
        )
    }

    fn handle_text_part(part: &Part, preserved: &mut Vec<Part>) {
        let Some(text) = part.as_text() else {
            preserved.push(part.clone());
            return;
        };
        if let Some(index) = text.rfind(FINAL_ANSWER_TAG) {
            let split = index + FINAL_ANSWER_TAG.len();
            let (reasoning, answer) = text.split_at(split);
            if !reasoning.is_empty() {
                preserved.push(Part::thought(reasoning));
            }
            if !answer.is_empty() {
                preserved.push(Part::text(answer));
            }
            return;
        }
        let is_reasoning = [PLANNING_TAG, REASONING_TAG, ACTION_TAG, REPLANNING_TAG]
            .iter()
            .any(|tag| text.starts_with(tag));
        if is_reasoning {
            preserved.push(Part::thought(text));
        } else {
            preserved.push(part.clone());
        }
    }
}

impl Planner for PlanReActPlanner {
    fn build_planning_instruction(
        &self,
        _ctx: &ReadonlyContext<'_>,
        _request: &LlmRequest,
    ) -> Option<String> {
        Some(Self::instruction())
    }

    fn process_planning_response(
        &self,
        _ctx: &CallbackContext,
        parts: &[Part],
    ) -> Option<Vec<Part>> {
        if parts.is_empty() {
            return None;
        }
        let mut preserved = Vec::with_capacity(parts.len());
        let mut first_call = None;
        for (index, part) in parts.iter().enumerate() {
            if let Part::FunctionCall(call) = part {
                if call.name.is_empty() {
                    continue;
                }
                preserved.push(part.clone());
                first_call = Some(index);
                break;
            }
            Self::handle_text_part(part, &mut preserved);
        }
        // Keep only the run of calls directly after the first one.
        if let Some(first) = first_call {
            preserved.extend(
                parts[first + 1..]
                    .iter()
                    .take_while(|part| matches!(part, Part::FunctionCall(_)))
                    .cloned(),
            );
        }
        Some(preserved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{InvocationContext, LlmAgent};
    use crate::config::RunConfig;
    use crate::sessions::{Session, StateMap};
    use crate::types::FunctionCall;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx() -> CallbackContext {
        let agent = Arc::new(LlmAgent::builder().name("planner").build());
        let invocation =
            InvocationContext::new("inv", agent, Session::new("a", "u", "s"), RunConfig::default());
        CallbackContext::new(invocation, StateMap::new())
    }

    #[test]
    fn splits_reasoning_from_final_answer() {
        let parts = vec![Part::text(format!(
            "{PLANNING_TAG} look it up {FINAL_ANSWER_TAG}It is 4."
        ))];
        let out = PlanReActPlanner.process_planning_response(&ctx(), &parts).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].is_thought());
        assert!(out[0].as_text().unwrap().ends_with(FINAL_ANSWER_TAG));
        assert_eq!(out[1], Part::text("It is 4."));
    }

    #[test]
    fn tagged_sections_become_thoughts() {
        let parts = vec![
            Part::text(format!("{REASONING_TAG} 2+2")),
            Part::text("plain"),
        ];
        let out = PlanReActPlanner.process_planning_response(&ctx(), &parts).unwrap();
        assert!(out[0].is_thought());
        assert!(!out[1].is_thought());
    }

    #[test]
    fn keeps_only_the_leading_run_of_calls() {
        let call = |name: &str| Part::FunctionCall(FunctionCall::new(name, json!({})));
        let parts = vec![
            Part::text(format!("{ACTION_TAG} calling")),
            call("a"),
            call("b"),
            Part::text("trailing"),
            call("c"),
        ];
        let out = PlanReActPlanner.process_planning_response(&ctx(), &parts).unwrap();
        assert_eq!(out.len(), 3);
        assert!(matches!(&out[2], Part::FunctionCall(c) if c.name == "b"));
    }
}

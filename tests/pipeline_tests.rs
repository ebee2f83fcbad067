//! Tests for request assembly and response post-processing.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;

use common::*;
use kestrel::agents::{BaseAgent, IncludeContents, Instruction, InvocationContext, LlmAgent};
use kestrel::code_executors::{CodeExecutionInput, CodeExecutionOutput, CodeExecutor};
use kestrel::error::{KestrelError, Result};
use kestrel::flows::processors::OUTPUT_SCHEMA_VALIDATION_FAILED;
use kestrel::planners::PlanReActPlanner;
use kestrel::sessions::{GetSessionConfig, SessionService, StateMap};
use kestrel::types::{Content, GenerateContentConfig, Part};

fn city_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {"city": {"type": "string"}},
        "required": ["city"],
    })
}

#[tokio::test]
async fn instructions_are_rendered_from_session_state() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_text("Hi Ada");
    let agent = LlmAgent::builder()
        .name("greeter")
        .description("Greets people.")
        .model(model.clone())
        .global_instruction("Company: {app_company}.")
        .instruction("Greet {user_name}. Nickname: [{nickname?}]. Keep {artifact.notes} as is.")
        .build();
    let state = StateMap::from([
        ("user_name".to_string(), json!("Ada")),
        ("app_company".to_string(), json!("Kestrel Ltd")),
    ]);
    let (runner, _, session_id) = setup(Arc::new(agent), Some(state)).await;

    run(&runner, &session_id, Content::user("hello")).await.unwrap();

    let instruction = model.requests()[0].system_instruction().to_string();
    assert_eq!(
        instruction,
        "Company: Kestrel Ltd.\n\n\
         Greet Ada. Nickname: []. Keep {artifact.notes} as is.\n\n\
         You are an agent. Your internal name is \"greeter\". \
         The description about you is \"Greets people.\""
    );
}

#[tokio::test]
async fn missing_required_placeholder_fails_before_the_model_call() {
    let model = Arc::new(MockLlm::new("mock-1"));
    let agent = LlmAgent::builder()
        .name("greeter")
        .model(model.clone())
        .instruction("Greet {user_name}.")
        .build();
    let (runner, _, session_id) = setup(Arc::new(agent), None).await;

    let err = run(&runner, &session_id, Content::user("hello")).await.unwrap_err();

    assert!(matches!(err, KestrelError::MissingContextVariable(name) if name == "user_name"));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn instruction_provider_output_is_used_verbatim() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_text("ok");
    let agent = LlmAgent::builder()
        .name("root")
        .model(model.clone())
        .instruction(Instruction::provider(|ctx| {
            format!("Agent {} says {{not_a_key}}", ctx.agent_name())
        }))
        .build();
    let (runner, _, session_id) = setup(Arc::new(agent), None).await;

    run(&runner, &session_id, Content::user("hello")).await.unwrap();

    assert!(model.requests()[0]
        .system_instruction()
        .starts_with("Agent root says {not_a_key}"));
}

#[tokio::test]
async fn generate_config_is_copied_onto_the_request() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_text("ok");
    let agent = LlmAgent::builder()
        .name("root")
        .model(model.clone())
        .generate_content_config(
            GenerateContentConfig::builder()
                .temperature(0.2)
                .max_output_tokens(256)
                .build(),
        )
        .build();
    let (runner, _, session_id) = setup(Arc::new(agent), None).await;

    run(&runner, &session_id, Content::user("hello")).await.unwrap();

    let config = &model.requests()[0].config;
    assert_eq!(config.temperature, Some(0.2));
    assert_eq!(config.max_output_tokens, Some(256));
}

#[tokio::test]
async fn include_contents_none_sends_only_the_current_turn() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_text("first answer").queue_text("second answer");
    let agent = LlmAgent::builder()
        .name("root")
        .model(model.clone())
        .include_contents(IncludeContents::None)
        .build();
    let (runner, _, session_id) = setup(Arc::new(agent), None).await;

    run(&runner, &session_id, Content::user("first")).await.unwrap();
    run(&runner, &session_id, Content::user("second")).await.unwrap();

    let contents = &model.requests()[1].contents;
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0].text(), "second");
}

#[tokio::test]
async fn valid_structured_output_is_canonicalized_and_saved() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_text("{ \"city\" :  \"Oslo\" }");
    let agent = LlmAgent::builder()
        .name("root")
        .model(model.clone())
        .output_schema(city_schema())
        .output_key("answer")
        .build();
    let (runner, service, session_id) = setup(Arc::new(agent), None).await;

    let events = run(&runner, &session_id, Content::user("where?")).await.unwrap();

    assert_eq!(texts(&events), vec![r#"{"city":"Oslo"}"#]);
    let request = &model.requests()[0];
    assert_eq!(request.config.response_schema, Some(city_schema()));
    assert_eq!(request.config.response_mime_type.as_deref(), Some("application/json"));

    let session = service
        .get_session(APP, USER, &session_id, &GetSessionConfig::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.state["answer"], json!({"city": "Oslo"}));
}

#[tokio::test]
async fn invalid_structured_output_becomes_an_error_coded_event() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_text("{\"town\": \"Oslo\"}");
    let agent = LlmAgent::builder()
        .name("root")
        .model(model.clone())
        .output_schema(city_schema())
        .output_key("answer")
        .build();
    let (runner, service, session_id) = setup(Arc::new(agent), None).await;

    let events = run(&runner, &session_id, Content::user("where?")).await.unwrap();

    assert_eq!(events.len(), 2);
    let diagnostic = events[0].content().unwrap().text();
    assert!(diagnostic.contains("did not match the required output schema"), "{diagnostic}");
    let error = &events[1];
    assert_eq!(
        error.response.error_code.as_deref(),
        Some(OUTPUT_SCHEMA_VALIDATION_FAILED)
    );
    assert!(error.content().is_none());
    assert!(error.is_final_response());

    let session = service
        .get_session(APP, USER, &session_id, &GetSessionConfig::default())
        .await
        .unwrap()
        .unwrap();
    assert!(!session.state.contains_key("answer"));
}

#[tokio::test]
async fn output_key_stores_plain_text() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_text("Paris");
    let agent = LlmAgent::builder()
        .name("root")
        .model(model.clone())
        .output_key("capital")
        .build();
    let (runner, _, session_id) = setup(Arc::new(agent), None).await;

    let events = run(&runner, &session_id, Content::user("capital of France?")).await.unwrap();

    assert_eq!(events[0].actions.state_delta["capital"], json!("Paris"));
}

#[tokio::test]
async fn plan_react_marks_reasoning_as_thought() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_text("/*PLANNING*/ Look it up. /*FINAL_ANSWER*/ 42");
    let agent = LlmAgent::builder()
        .name("root")
        .model(model.clone())
        .planner(Arc::new(PlanReActPlanner::new()))
        .output_key("answer")
        .build();
    let (runner, _, session_id) = setup(Arc::new(agent), None).await;

    let events = run(&runner, &session_id, Content::user("meaning of life?")).await.unwrap();

    let parts = &events[0].content().unwrap().parts;
    assert_eq!(parts.len(), 2);
    assert!(parts[0].is_thought());
    assert_eq!(parts[1], Part::text(" 42"));
    assert_eq!(events[0].actions.state_delta["answer"], json!(" 42"));
    assert!(model.requests()[0]
        .system_instruction()
        .contains("/*FINAL_ANSWER*/"));
}

struct FixedOutputExecutor;

#[async_trait]
impl CodeExecutor for FixedOutputExecutor {
    async fn execute_code(
        &self,
        _ctx: &InvocationContext,
        input: CodeExecutionInput,
    ) -> Result<CodeExecutionOutput> {
        assert_eq!(input.code, "print(2 + 2)");
        Ok(CodeExecutionOutput {
            stdout: "4".into(),
            stderr: String::new(),
        })
    }
}

#[tokio::test]
async fn code_blocks_are_executed_and_fed_back() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model
        .queue_text("Let me compute.\n```tool_code\nprint(2 + 2)\n```")
        .queue_text("The answer is 4.");
    let agent = LlmAgent::builder()
        .name("root")
        .model(model.clone())
        .code_executor(Arc::new(FixedOutputExecutor))
        .build();
    let (runner, _, session_id) = setup(Arc::new(agent) as Arc<dyn BaseAgent>, None).await;

    let events = run(&runner, &session_id, Content::user("2 + 2?")).await.unwrap();

    assert_eq!(events.len(), 3);
    let code_parts = &events[0].content().unwrap().parts;
    assert!(matches!(code_parts.last(), Some(Part::ExecutableCode(code)) if code.code == "print(2 + 2)"));
    assert!(events[1].has_trailing_code_execution_result());
    assert_eq!(texts(&events[2..]), vec!["The answer is 4."]);

    // Past code and its output are shown to the model as delimited text.
    let history = &model.requests()[1].contents;
    let rendered: String = history.iter().map(Content::text).collect();
    assert!(rendered.contains("```tool_code\nprint(2 + 2)\n```"), "{rendered}");
    assert!(rendered.contains("```tool_output\nCode execution result:\n4\n"), "{rendered}");
}

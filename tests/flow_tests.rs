//! Tests for the invocation loop and function-call dispatch.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::*;
use kestrel::agents::LlmAgent;
use kestrel::config::RunConfig;
use kestrel::error::KestrelError;
use kestrel::flows::functions::CLIENT_FUNCTION_CALL_ID_PREFIX;
use kestrel::models::LlmResponse;
use kestrel::sessions::{GetSessionConfig, SessionService};
use kestrel::tools::{FunctionTool, ToolParameters};
use kestrel::types::{Content, Role, StreamingMode};

fn calc_tool() -> FunctionTool {
    FunctionTool::new(
        "calc",
        "Add two numbers.",
        ToolParameters::object()
            .number("a", "First operand", true)
            .number("b", "Second operand", true)
            .build(),
        |args, ctx| async move {
            let sum = args.get_f64("a")? + args.get_f64("b")?;
            ctx.set_state("last_sum", json!(sum));
            Ok::<_, KestrelError>(json!({ "sum": sum }))
        },
    )
}

fn remember_tool() -> FunctionTool {
    FunctionTool::new(
        "remember",
        "Store a fact for later.",
        ToolParameters::object()
            .string("fact", "The fact to store", true)
            .build(),
        |args, ctx| async move {
            let fact = args.get_str("fact")?.to_string();
            ctx.set_state("fact", json!(fact));
            Ok::<_, KestrelError>(json!({ "stored": fact, "saw_sum": ctx.state_get("last_sum") }))
        },
    )
}

fn agent_with(model: &Arc<MockLlm>, tools: Vec<FunctionTool>) -> Arc<LlmAgent> {
    Arc::new(
        LlmAgent::builder()
            .name("root")
            .model(model.clone())
            .tools(tool_list(tools))
            .build(),
    )
}

#[tokio::test]
async fn text_only_response_ends_the_turn() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_text("Hello there.");
    let (runner, service, session_id) = setup(agent_with(&model, vec![]), None).await;

    let events = run(&runner, &session_id, Content::user("hi")).await.unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].author, "root");
    assert!(events[0].is_final_response());
    assert_eq!(texts(&events), vec!["Hello there."]);
    assert_eq!(model.call_count(), 1);

    let session = service
        .get_session(APP, USER, &session_id, &GetSessionConfig::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.events.len(), 2);
    assert!(session.events[0].is_from_user());
}

#[tokio::test]
async fn batched_calls_merge_into_one_response_event() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model
        .queue_calls(&[
            ("calc", json!({"a": 2, "b": 3})),
            ("remember", json!({"fact": "sky is blue"})),
        ])
        .queue_text("Done: 5.");
    let (runner, service, session_id) =
        setup(agent_with(&model, vec![calc_tool(), remember_tool()]), None).await;

    let events = run(&runner, &session_id, Content::user("add and remember")).await.unwrap();
    assert_eq!(events.len(), 3);

    let calls = events[0].function_calls();
    assert_eq!(calls.len(), 2);
    for call in &calls {
        assert!(call.id.as_deref().unwrap().starts_with(CLIENT_FUNCTION_CALL_ID_PREFIX));
    }

    let merged = &events[1];
    let responses = merged.function_responses();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].name, "calc");
    assert_eq!(responses[1].name, "remember");
    assert_eq!(responses[0].id, calls[0].id);
    assert_eq!(responses[1].id, calls[1].id);
    assert_eq!(responses[0].response, json!({"sum": 5.0}));
    // The second call sees the first call's write.
    assert_eq!(responses[1].response["saw_sum"], json!(5.0));
    assert_eq!(merged.actions.state_delta["last_sum"], json!(5.0));
    assert_eq!(merged.actions.state_delta["fact"], json!("sky is blue"));

    assert!(events[2].is_final_response());
    assert_eq!(model.call_count(), 2);

    let session = service
        .get_session(APP, USER, &session_id, &GetSessionConfig::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.state["fact"], json!("sky is blue"));
    assert_eq!(session.state["last_sum"], json!(5.0));
}

#[tokio::test]
async fn model_sees_declarations_and_previous_results() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model
        .queue_calls(&[("calc", json!({"a": 1, "b": 1}))])
        .queue_text("2");
    let (runner, _, session_id) = setup(agent_with(&model, vec![calc_tool()]), None).await;

    run(&runner, &session_id, Content::user("1+1?")).await.unwrap();

    let requests = model.requests();
    assert_eq!(requests[0].model.as_deref(), Some("mock-1"));
    assert_eq!(requests[0].config.tools.len(), 1);
    assert_eq!(requests[0].config.tools[0].name, "calc");
    assert!(requests[0].tools_dict.contains_key("calc"));

    let history = &requests[1].contents;
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].role, Role::Model);
    assert_eq!(history[2].function_responses()[0].response, json!({"sum": 2.0}));
    // Client-assigned ids never reach the model.
    assert_eq!(history[1].function_calls()[0].id, None);
}

#[tokio::test]
async fn invalid_arguments_become_an_error_result() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model
        .queue_calls(&[("calc", json!({"a": "two"}))])
        .queue_text("Sorry.");
    let (runner, _, session_id) = setup(agent_with(&model, vec![calc_tool()]), None).await;

    let events = run(&runner, &session_id, Content::user("add")).await.unwrap();

    let response = &events[1].function_responses()[0].response;
    let message = response["error"].as_str().unwrap();
    assert!(message.starts_with("Argument validation failed"), "{message}");
    assert_eq!(texts(&events), vec!["Sorry."]);
}

#[tokio::test]
async fn tool_failure_is_reported_to_the_model() {
    let failing = FunctionTool::new("flaky", "Always fails.", ToolParameters::empty(), |_, _| async {
        Err::<serde_json::Value, _>(KestrelError::tool_execution("flaky", "backend down"))
    });
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_calls(&[("flaky", json!({}))]).queue_text("It failed.");
    let (runner, _, session_id) = setup(agent_with(&model, vec![failing]), None).await;

    let events = run(&runner, &session_id, Content::user("go")).await.unwrap();

    let response = &events[1].function_responses()[0].response;
    assert!(response["error"].as_str().unwrap().contains("backend down"));
}

#[tokio::test]
async fn unknown_tool_aborts_the_step() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_calls(&[("missing", json!({}))]);
    let (runner, _, session_id) = setup(agent_with(&model, vec![]), None).await;

    let (events, err) =
        run_collecting(&runner, &session_id, Content::user("go"), RunConfig::default()).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(err, Some(KestrelError::ToolNotFound(name)) if name == "missing"));
}

#[tokio::test]
async fn long_running_tool_without_result_ends_the_turn() {
    let job = FunctionTool::new("start_job", "Kick off a job.", ToolParameters::empty(), |_, _| async {
        Ok::<_, KestrelError>(serde_json::Value::Null)
    })
    .long_running();
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_calls(&[("start_job", json!({}))]);
    let (runner, _, session_id) = setup(agent_with(&model, vec![job]), None).await;

    let events = run(&runner, &session_id, Content::user("start")).await.unwrap();

    assert_eq!(events.len(), 1);
    let call_id = events[0].function_calls()[0].id.clone().unwrap();
    let long_running = events[0].long_running_tool_ids.as_ref().unwrap();
    assert!(long_running.contains(&call_id));
    assert!(events[0].is_final_response());
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn end_invocation_stops_after_the_current_step() {
    let stop = FunctionTool::new("stop", "Stop the turn.", ToolParameters::empty(), |_, ctx| async move {
        ctx.invocation().end_invocation();
        Ok::<_, KestrelError>(json!({"stopped": true}))
    });
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_calls(&[("stop", json!({}))]).queue_text("never sent");
    let (runner, _, session_id) = setup(agent_with(&model, vec![stop]), None).await;

    let events = run(&runner, &session_id, Content::user("stop")).await.unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[1].function_responses()[0].response, json!({"stopped": true}));
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn partial_last_event_is_fatal() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue(text_response("truncated answ").into_partial());
    let (runner, service, session_id) = setup(agent_with(&model, vec![]), None).await;

    let (events, err) =
        run_collecting(&runner, &session_id, Content::user("long essay"), RunConfig::default())
            .await;

    assert_eq!(events.len(), 1);
    assert!(events[0].is_partial());
    let err = err.unwrap();
    assert!(matches!(err, KestrelError::PartialLastEvent));
    assert!(err.is_fatal());

    // Partial events are never stored.
    let session = service
        .get_session(APP, USER, &session_id, &GetSessionConfig::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.events.len(), 1);
}

#[tokio::test]
async fn sse_streams_partials_then_stores_the_aggregate() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_turn(vec![
        text_response("Hel").into_partial(),
        text_response("lo").into_partial(),
        text_response("Hello"),
    ]);
    let (runner, service, session_id) = setup(agent_with(&model, vec![]), None).await;
    let config = RunConfig::default().with_streaming_mode(StreamingMode::Sse);

    let events = run_with(&runner, &session_id, Content::user("hi"), config).await.unwrap();

    assert_eq!(events.len(), 3);
    assert!(events[0].is_partial() && events[1].is_partial());
    assert!(!events[2].is_partial());
    assert_eq!(model.stream_flags(), vec![true]);

    let session = service
        .get_session(APP, USER, &session_id, &GetSessionConfig::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.events.len(), 2);
    assert_eq!(session.events[1].content().unwrap().text(), "Hello");
}

#[tokio::test]
async fn non_streaming_mode_asks_for_one_response() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_text("ok");
    let (runner, _, session_id) = setup(agent_with(&model, vec![]), None).await;

    run(&runner, &session_id, Content::user("hi")).await.unwrap();

    assert_eq!(model.stream_flags(), vec![false]);
}

#[tokio::test]
async fn llm_call_limit_is_enforced_per_invocation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let ping = FunctionTool::new("ping", "Ping.", ToolParameters::empty(), move |_, _| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, KestrelError>(json!("pong"))
        }
    });
    let model = Arc::new(MockLlm::new("mock-1"));
    for _ in 0..3 {
        model.queue_calls(&[("ping", json!({}))]);
    }
    let (runner, _, session_id) = setup(agent_with(&model, vec![ping]), None).await;
    let config = RunConfig::default().with_max_llm_calls(2);

    let (events, err) = run_collecting(&runner, &session_id, Content::user("loop"), config).await;

    assert!(matches!(err, Some(KestrelError::LlmCallsLimitExceeded(2))));
    assert_eq!(model.call_count(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(events.len(), 4);
    assert_eq!(events[1].function_responses()[0].response, json!({"result": "pong"}));
}

#[tokio::test]
async fn empty_responses_are_dropped() {
    let model = Arc::new(MockLlm::new("mock-1"));
    model.queue_turn(vec![LlmResponse::default(), text_response("after nothing")]);
    let (runner, _, session_id) = setup(agent_with(&model, vec![]), None).await;

    let events = run(&runner, &session_id, Content::user("hi")).await.unwrap();

    assert_eq!(texts(&events), vec!["after nothing"]);
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn missing_session_is_an_error() {
    let model = Arc::new(MockLlm::new("mock-1"));
    let (runner, _, _) = setup(agent_with(&model, vec![]), None).await;

    let err = run(&runner, "no-such-session", Content::user("hi"))
        .await
        .unwrap_err();

    assert!(matches!(err, KestrelError::SessionNotFound { .. }));
    assert_eq!(model.call_count(), 0);
}

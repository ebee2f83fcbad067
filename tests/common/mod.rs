//! Shared test helpers and scripted mock model.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use kestrel::agents::BaseAgent;
use kestrel::config::RunConfig;
use kestrel::error::{KestrelError, Result};
use kestrel::events::Event;
use kestrel::models::{Llm, LlmRequest, LlmResponse, LlmResponseStream};
use kestrel::runner::Runner;
use kestrel::sessions::{InMemorySessionService, SessionService, StateMap};
use kestrel::tools::{FunctionTool, Tool};
use kestrel::types::{Content, FunctionCall, Part, Role};

pub const APP: &str = "test-app";
pub const USER: &str = "u1";

/// A model that replays queued turns and records every request it receives.
///
/// Each queued turn is the list of responses one call yields, so a streamed
/// turn is its partial chunks followed by the aggregated response.
pub struct MockLlm {
    model: String,
    turns: Mutex<VecDeque<Vec<LlmResponse>>>,
    requests: Arc<Mutex<Vec<LlmRequest>>>,
    stream_flags: Arc<Mutex<Vec<bool>>>,
}

impl MockLlm {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            turns: Mutex::new(VecDeque::new()),
            requests: Arc::new(Mutex::new(Vec::new())),
            stream_flags: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a one-response turn.
    pub fn queue(&self, response: LlmResponse) -> &Self {
        self.queue_turn(vec![response])
    }

    pub fn queue_turn(&self, responses: Vec<LlmResponse>) -> &Self {
        self.turns.lock().unwrap().push_back(responses);
        self
    }

    pub fn queue_text(&self, text: &str) -> &Self {
        self.queue(text_response(text))
    }

    pub fn queue_calls(&self, calls: &[(&str, Value)]) -> &Self {
        self.queue(calls_response(calls))
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn stream_flags(&self) -> Vec<bool> {
        self.stream_flags.lock().unwrap().clone()
    }
}

#[async_trait]
impl Llm for MockLlm {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_content(
        &self,
        request: &LlmRequest,
        stream: bool,
    ) -> std::result::Result<LlmResponseStream, KestrelError> {
        self.requests.lock().unwrap().push(request.clone());
        self.stream_flags.lock().unwrap().push(stream);
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| KestrelError::model(&self.model, "no scripted response left"))?;
        Ok(async_stream::stream! {
            for response in turn {
                yield Ok::<_, KestrelError>(response);
            }
        }
        .boxed())
    }
}

pub fn text_response(text: &str) -> LlmResponse {
    LlmResponse::from_content(Content::model(text))
}

/// A model turn carrying one function call per `(name, args)`, without ids.
pub fn calls_response(calls: &[(&str, Value)]) -> LlmResponse {
    let parts = calls
        .iter()
        .map(|(name, args)| Part::FunctionCall(FunctionCall::new(*name, args.clone())))
        .collect();
    LlmResponse::from_content(Content::new(Role::Model, parts))
}

/// Runner over a fresh in-memory service with one session created.
pub async fn setup(
    agent: Arc<dyn BaseAgent>,
    state: Option<StateMap>,
) -> (Runner, Arc<InMemorySessionService>, String) {
    let service = Arc::new(InMemorySessionService::new());
    let session = service
        .create_session(APP, USER, state, None)
        .await
        .unwrap();
    let runner = Runner::new(APP, agent, service.clone()).unwrap();
    (runner, service, session.id)
}

/// Drain one invocation, stopping at the first error.
pub async fn run(runner: &Runner, session_id: &str, message: Content) -> Result<Vec<Event>> {
    run_with(runner, session_id, message, RunConfig::default()).await
}

pub async fn run_with(
    runner: &Runner,
    session_id: &str,
    message: Content,
    run_config: RunConfig,
) -> Result<Vec<Event>> {
    let mut stream = runner.run_async(USER, session_id, message, run_config);
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event?);
    }
    Ok(events)
}

/// Like [`run`], but also returns the events yielded before a failure.
pub async fn run_collecting(
    runner: &Runner,
    session_id: &str,
    message: Content,
    run_config: RunConfig,
) -> (Vec<Event>, Option<KestrelError>) {
    let mut stream = runner.run_async(USER, session_id, message, run_config);
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => events.push(event),
            Err(err) => return (events, Some(err)),
        }
    }
    (events, None)
}

pub fn texts(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(Event::content)
        .map(Content::text)
        .filter(|text| !text.is_empty())
        .collect()
}

pub fn tool_list(tools: Vec<FunctionTool>) -> Vec<Arc<dyn Tool>> {
    tools
        .into_iter()
        .map(|tool| Arc::new(tool) as Arc<dyn Tool>)
        .collect()
}

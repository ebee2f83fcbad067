//! Entry point that runs an agent tree against a stored session.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_stream::try_stream;
use futures::StreamExt;

use crate::agents::{
    find_agent, find_parent, new_invocation_id, validate_agent_tree, BaseAgent, EventStream,
    InvocationContext,
};
use crate::config::RunConfig;
use crate::error::{KestrelError, Result};
use crate::events::{Event, USER_AUTHOR};
use crate::sessions::{GetSessionConfig, SessionService};
use crate::types::{Content, StreamingMode};

/// Runs turns of an agent tree, persisting every complete event.
#[derive(Clone)]
pub struct Runner {
    app_name: String,
    agent: Arc<dyn BaseAgent>,
    session_service: Arc<dyn SessionService>,
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("app_name", &self.app_name)
            .field("agent", &self.agent.name())
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Fails when the agent tree has empty, reserved or duplicate names.
    pub fn new(
        app_name: impl Into<String>,
        agent: Arc<dyn BaseAgent>,
        session_service: Arc<dyn SessionService>,
    ) -> Result<Self> {
        validate_agent_tree(&agent)?;
        Ok(Self {
            app_name: app_name.into(),
            agent,
            session_service,
        })
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn agent(&self) -> &Arc<dyn BaseAgent> {
        &self.agent
    }

    pub fn session_service(&self) -> &Arc<dyn SessionService> {
        &self.session_service
    }

    /// Append `new_message` to the session and run one invocation.
    ///
    /// Partial events are passed through without being stored; every other
    /// event is appended to the session before it is yielded.
    pub fn run_async(
        &self,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        new_message: Content,
        run_config: RunConfig,
    ) -> EventStream {
        let runner = self.clone();
        let user_id = user_id.into();
        let session_id = session_id.into();
        Box::pin(try_stream! {
            let session = runner
                .session_service
                .get_session(&runner.app_name, &user_id, &session_id, &GetSessionConfig::default())
                .await?
                .ok_or_else(|| KestrelError::SessionNotFound {
                    app_name: runner.app_name.clone(),
                    user_id: user_id.clone(),
                    session_id: session_id.clone(),
                })?;

            let invocation_id = new_invocation_id();
            let streaming_mode = run_config.streaming_mode;
            let ctx = InvocationContext::new(
                invocation_id.clone(),
                Arc::clone(&runner.agent),
                session,
                run_config,
            )
            .with_user_content(new_message.clone());

            let user_event = Event::new(invocation_id.clone(), USER_AUTHOR).with_content(new_message);
            runner.append(&ctx, user_event).await?;

            let agent = {
                let session = ctx.session.read().await;
                runner.find_agent_to_run(&session.events)
            };
            tracing::debug!(
                invocation_id = %invocation_id,
                agent = %agent.name(),
                session_id = %session_id,
                "invocation started"
            );

            let ctx = ctx.for_agent(Arc::clone(&agent));
            let mut events = match streaming_mode {
                StreamingMode::Bidi => agent.run_live(ctx.clone()),
                StreamingMode::None | StreamingMode::Sse => agent.run_async(ctx.clone()),
            };
            while let Some(event) = events.next().await {
                let event = event?;
                if event.is_partial() {
                    yield event;
                    continue;
                }
                yield runner.append(&ctx, event).await?;
            }
        })
    }

    async fn append(&self, ctx: &InvocationContext, event: Event) -> Result<Event> {
        let mut session = ctx.session.write().await;
        self.session_service.append_event(&mut session, event).await
    }

    /// Pick the agent that should answer the latest message.
    ///
    /// A function response goes back to the agent that made the call.
    /// Otherwise the most recent agent that spoke keeps the conversation when
    /// every agent on its path to the root could transfer back up; failing
    /// that, the root agent runs.
    fn find_agent_to_run(&self, events: &[Event]) -> Arc<dyn BaseAgent> {
        if let Some(caller) = find_matching_function_call(events)
            .and_then(|event| find_agent(&self.agent, &event.author))
        {
            return caller;
        }
        for event in events.iter().rev().filter(|event| !event.is_from_user()) {
            if event.author == self.agent.name() {
                return Arc::clone(&self.agent);
            }
            let Some(agent) = self.agent.find_sub_agent(&event.author) else {
                continue;
            };
            if self.is_transferable_across_agent_tree(&agent) {
                return agent;
            }
        }
        Arc::clone(&self.agent)
    }

    fn is_transferable_across_agent_tree(&self, agent: &Arc<dyn BaseAgent>) -> bool {
        let mut current = Some(Arc::clone(agent));
        while let Some(agent) = current {
            match agent.as_llm_agent() {
                Some(llm) if !llm.disallow_transfer_to_parent() => {}
                _ => return false,
            }
            current = find_parent(&self.agent, agent.name());
        }
        true
    }
}

/// The event holding the calls answered by the latest event, when the latest
/// event is a function response.
fn find_matching_function_call(events: &[Event]) -> Option<&Event> {
    let (last, earlier) = events.split_last()?;
    let answered: HashSet<&str> = last
        .function_responses()
        .iter()
        .filter_map(|response| response.id.as_deref())
        .collect();
    if answered.is_empty() {
        return None;
    }
    earlier.iter().rev().find(|event| {
        event
            .function_calls()
            .iter()
            .any(|call| call.id.as_deref().is_some_and(|id| answered.contains(id)))
    })
}

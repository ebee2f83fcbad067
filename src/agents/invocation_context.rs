//! State shared by everything that runs during one invocation.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::base_agent::{find_agent, BaseAgent};
use crate::config::RunConfig;
use crate::error::{KestrelError, Result};
use crate::sessions::{Session, StateMap};
use crate::types::Content;

/// Generate a fresh invocation id.
pub fn new_invocation_id() -> String {
    format!("e-{}", Uuid::new_v4())
}

/// Everything an agent needs while handling one user message.
///
/// Cloning is cheap; clones share the session, the end-of-invocation flag
/// and the model call counter, so a transfer keeps all three.
#[derive(Clone)]
pub struct InvocationContext {
    pub invocation_id: String,
    /// Agent currently running.
    pub agent: Arc<dyn BaseAgent>,
    /// Root of the agent tree; transfers resolve names from here.
    pub root_agent: Arc<dyn BaseAgent>,
    /// Working copy of the session. The runner appends every non-partial
    /// event to it before the next event is produced.
    pub session: Arc<RwLock<Session>>,
    /// The user message that started this invocation.
    pub user_content: Option<Content>,
    /// Dotted agent ancestry used to scope history visibility.
    pub branch: Option<String>,
    pub run_config: RunConfig,
    app_name: String,
    user_id: String,
    session_id: String,
    end_invocation: CancellationToken,
    llm_call_count: Arc<AtomicUsize>,
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("invocation_id", &self.invocation_id)
            .field("agent", &self.agent.name())
            .field("session_id", &self.session_id)
            .field("branch", &self.branch)
            .field("ended", &self.is_end_of_invocation())
            .finish()
    }
}

impl InvocationContext {
    pub fn new(
        invocation_id: impl Into<String>,
        root_agent: Arc<dyn BaseAgent>,
        session: Session,
        run_config: RunConfig,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            agent: Arc::clone(&root_agent),
            root_agent,
            app_name: session.app_name.clone(),
            user_id: session.user_id.clone(),
            session_id: session.id.clone(),
            session: Arc::new(RwLock::new(session)),
            user_content: None,
            branch: None,
            run_config,
            end_invocation: CancellationToken::new(),
            llm_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A context for running `agent` inside the same invocation.
    pub fn for_agent(&self, agent: Arc<dyn BaseAgent>) -> Self {
        let mut ctx = self.clone();
        ctx.agent = agent;
        ctx
    }

    pub fn with_user_content(mut self, content: Content) -> Self {
        self.user_content = Some(content);
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn agent_name(&self) -> &str {
        self.agent.name()
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Snapshot of the session's current state.
    pub async fn session_state(&self) -> StateMap {
        self.session.read().await.state.clone()
    }

    /// Resolve an agent by name anywhere in the tree.
    pub fn find_agent(&self, name: &str) -> Option<Arc<dyn BaseAgent>> {
        find_agent(&self.root_agent, name)
    }

    /// Stop the invocation; loops halt before starting their next stage or step.
    pub fn end_invocation(&self) {
        self.end_invocation.cancel();
    }

    pub fn is_end_of_invocation(&self) -> bool {
        self.end_invocation.is_cancelled()
    }

    /// Token cancelled when the invocation ends.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.end_invocation.clone()
    }

    /// Count one model call, failing once the configured budget is exceeded.
    pub fn increment_llm_call_count(&self) -> Result<()> {
        let count = self.llm_call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.run_config.exceeds_llm_call_limit(count) {
            return Err(KestrelError::LlmCallsLimitExceeded(self.run_config.max_llm_calls));
        }
        Ok(())
    }

    pub fn llm_call_count(&self) -> usize {
        self.llm_call_count.load(Ordering::SeqCst)
    }
}

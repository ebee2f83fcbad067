//! Per-call context handed to tools.

use std::fmt;
use std::ops::Deref;

use crate::agents::{CallbackContext, InvocationContext};
use crate::auth::{AuthConfig, AuthCredential};
use crate::error::{KestrelError, Result};
use crate::events::EventActions;
use crate::sessions::StateMap;

/// Context for one function call.
///
/// Extends [`CallbackContext`] with the id of the call being executed and the
/// action bundle of the event that carried the call. Clones share pending
/// writes, so the dispatcher sees everything a tool records.
#[derive(Clone)]
pub struct ToolContext {
    callback: CallbackContext,
    function_call_id: Option<String>,
    event_actions: EventActions,
}

impl Deref for ToolContext {
    type Target = CallbackContext;

    fn deref(&self) -> &Self::Target {
        &self.callback
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("function_call_id", &self.function_call_id)
            .field("agent", &self.agent_name())
            .finish()
    }
}

impl ToolContext {
    pub fn new(
        invocation: InvocationContext,
        state: StateMap,
        function_call_id: Option<String>,
        event_actions: EventActions,
    ) -> Self {
        Self {
            callback: CallbackContext::new(invocation, state),
            function_call_id,
            event_actions,
        }
    }

    pub fn function_call_id(&self) -> Option<&str> {
        self.function_call_id.as_deref()
    }

    /// Actions of the event that issued this call. Read-only; writes made
    /// through this context go to the call's own result event.
    pub fn event_actions(&self) -> &EventActions {
        &self.event_actions
    }

    /// Ask the client for a credential. The dispatcher turns the request into
    /// a `request_credential` call once this tool's result is recorded.
    pub fn request_credential(&self, auth_config: AuthConfig) -> Result<()> {
        let call_id = self.function_call_id.clone().ok_or_else(|| {
            KestrelError::InvalidState("request_credential needs a function call id".into())
        })?;
        self.update_actions(|actions| {
            actions.requested_auth_configs.insert(call_id, auth_config);
        });
        Ok(())
    }

    /// The credential the client supplied for `auth_config`, if any.
    pub fn get_auth_response(&self, auth_config: &AuthConfig) -> Option<AuthCredential> {
        self.state_get_as(&auth_config.state_key())
    }

    /// Hand the conversation to another agent once this call completes.
    pub fn transfer_to_agent(&self, agent_name: impl Into<String>) {
        let agent_name = agent_name.into();
        self.update_actions(|actions| actions.transfer_to_agent = Some(agent_name));
    }

    /// End the turn on this call's result instead of summarizing it.
    pub fn skip_summarization(&self) {
        self.update_actions(|actions| actions.skip_summarization = Some(true));
    }
}

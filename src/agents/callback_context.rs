//! Contexts handed to callbacks and instruction providers.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::invocation_context::InvocationContext;
use crate::events::EventActions;
use crate::sessions::{State, StateMap};
use crate::types::Content;

/// Read-only view passed to instruction providers and planners.
#[derive(Debug, Clone, Copy)]
pub struct ReadonlyContext<'a> {
    invocation: &'a InvocationContext,
    state: &'a StateMap,
}

impl<'a> ReadonlyContext<'a> {
    pub fn new(invocation: &'a InvocationContext, state: &'a StateMap) -> Self {
        Self { invocation, state }
    }

    pub fn invocation(&self) -> &'a InvocationContext {
        self.invocation
    }

    pub fn agent_name(&self) -> &'a str {
        self.invocation.agent_name()
    }

    pub fn invocation_id(&self) -> &'a str {
        &self.invocation.invocation_id
    }

    pub fn user_content(&self) -> Option<&'a Content> {
        self.invocation.user_content.as_ref()
    }

    pub fn state(&self) -> &'a StateMap {
        self.state
    }
}

#[derive(Debug, Default)]
struct Pending {
    state: State,
    actions: EventActions,
}

/// Mutable context for model callbacks.
///
/// State reads see the snapshot taken when the context was created plus any
/// writes made through it. Writes and other actions are collected and land on
/// the event the callback belongs to. Clones share the same pending writes.
#[derive(Clone)]
pub struct CallbackContext {
    invocation: InvocationContext,
    pending: Arc<Mutex<Pending>>,
}

impl fmt::Debug for CallbackContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackContext")
            .field("invocation_id", &self.invocation.invocation_id)
            .field("agent", &self.invocation.agent_name())
            .finish()
    }
}

impl CallbackContext {
    pub fn new(invocation: InvocationContext, state: StateMap) -> Self {
        Self {
            invocation,
            pending: Arc::new(Mutex::new(Pending {
                state: State::new(state),
                actions: EventActions::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn invocation(&self) -> &InvocationContext {
        &self.invocation
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation.invocation_id
    }

    pub fn agent_name(&self) -> &str {
        self.invocation.agent_name()
    }

    pub fn user_content(&self) -> Option<&Content> {
        self.invocation.user_content.as_ref()
    }

    pub fn state_get(&self, key: &str) -> Option<Value> {
        self.lock().state.get(key).cloned()
    }

    pub fn state_get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.lock().state.get_as(key)
    }

    /// Record a state write. Prefixes pick the scope, see [`crate::sessions::StateScope`].
    pub fn set_state(&self, key: impl Into<String>, value: Value) {
        self.lock().state.set(key, value);
    }

    /// Snapshot merged with writes made so far.
    pub fn state(&self) -> StateMap {
        self.lock().state.to_map()
    }

    /// Mutate the pending action bundle.
    pub fn update_actions(&self, f: impl FnOnce(&mut EventActions)) {
        f(&mut self.lock().actions);
    }

    /// The action bundle collected so far, state writes included.
    pub fn actions(&self) -> EventActions {
        let pending = self.lock();
        let mut actions = pending.actions.clone();
        actions
            .state_delta
            .extend(pending.state.delta().iter().map(|(k, v)| (k.clone(), v.clone())));
        actions
    }
}

//! Session: one conversation's transcript plus its state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{is_temp_key, StateMap};
use crate::events::Event;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    /// Private state overlaid with app- and user-scoped keys at read time.
    #[serde(default)]
    pub state: StateMap,
    #[serde(default)]
    pub events: Vec<Event>,
    pub last_update_time: DateTime<Utc>,
}

impl Session {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            state: StateMap::new(),
            events: Vec::new(),
            last_update_time: Utc::now(),
        }
    }

    /// Apply an event to this in-memory copy and return the event as stored.
    ///
    /// Partial events are returned untouched. Every delta key reaches
    /// `state`, temporary keys included, since this copy only lives for the
    /// current turn; the transcript keeps the event with temporary keys removed.
    pub fn apply_event(&mut self, mut event: Event) -> Event {
        if event.is_partial() {
            return event;
        }
        for (key, value) in &event.actions.state_delta {
            self.state.insert(key.clone(), value.clone());
        }
        event
            .actions
            .state_delta
            .retain(|key, _| !is_temp_key(key));
        self.last_update_time = event.timestamp;
        self.events.push(event.clone());
        event
    }
}

//! Session storage contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::session::Session;
use super::state::StateMap;
use crate::error::Result;
use crate::events::Event;

/// Filters applied to the transcript returned by [`SessionService::get_session`].
#[derive(Debug, Clone, Default)]
pub struct GetSessionConfig {
    /// Keep only the most recent `n` events.
    pub num_recent_events: Option<usize>,
    /// Keep only events at or after this time.
    pub after_timestamp: Option<DateTime<Utc>>,
}

impl GetSessionConfig {
    pub(crate) fn apply(&self, events: &mut Vec<Event>) {
        if let Some(after) = self.after_timestamp {
            events.retain(|event| event.timestamp >= after);
        }
        if let Some(n) = self.num_recent_events {
            let skip = events.len().saturating_sub(n);
            events.drain(..skip);
        }
    }
}

/// Persistent home of sessions and their app/user state overlays.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Create a session. A generated id is used when `session_id` is `None`.
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<StateMap>,
        session_id: Option<String>,
    ) -> Result<Session>;

    /// Read a session with app/user overlays merged into its state.
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: &GetSessionConfig,
    ) -> Result<Option<Session>>;

    /// List a user's sessions. Returned sessions carry no events.
    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<Vec<Session>>;

    async fn delete_session(&self, app_name: &str, user_id: &str, session_id: &str)
        -> Result<()>;

    /// Replace the stored private state, events and timestamp of `session`.
    ///
    /// App, user and temp keys in `session.state` are ignored. Overlays only
    /// change through [`SessionService::append_event`].
    async fn update_session(&self, session: &Session) -> Result<()>;

    /// Apply `event` to the working `session` and persist it.
    ///
    /// Partial events are returned without effect. Otherwise the working copy
    /// receives the whole delta, the store receives it minus temporary keys
    /// (app/user keys go to their overlays), the event is appended and the
    /// session's update time advances to the event's timestamp.
    async fn append_event(&self, session: &mut Session, event: Event) -> Result<Event>;
}

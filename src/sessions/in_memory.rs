//! In-process session store.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::service::{GetSessionConfig, SessionService};
use super::session::Session;
use super::state::{ScopedDelta, StateMap};
use crate::error::{KestrelError, Result};
use crate::events::Event;

#[derive(Debug, Default)]
struct Store {
    /// app -> user -> session id -> session (private state only).
    sessions: HashMap<String, HashMap<String, HashMap<String, Session>>>,
    /// app -> `app_` keys.
    app_state: HashMap<String, StateMap>,
    /// app -> user -> `user_` keys.
    user_state: HashMap<String, HashMap<String, StateMap>>,
}

impl Store {
    fn session_mut(&mut self, app_name: &str, user_id: &str, id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(app_name)?.get_mut(user_id)?.get_mut(id)
    }

    fn write_overlays(&mut self, app_name: &str, user_id: &str, scoped: &mut ScopedDelta) {
        if !scoped.app.is_empty() {
            self.app_state
                .entry(app_name.to_string())
                .or_default()
                .extend(std::mem::take(&mut scoped.app));
        }
        if !scoped.user.is_empty() {
            self.user_state
                .entry(app_name.to_string())
                .or_default()
                .entry(user_id.to_string())
                .or_default()
                .extend(std::mem::take(&mut scoped.user));
        }
    }

    /// Copy of a stored session with the current overlays merged in.
    fn merged(&self, stored: &Session) -> Session {
        let mut session = stored.clone();
        if let Some(app) = self.app_state.get(&session.app_name) {
            session.state.extend(app.clone());
        }
        if let Some(user) = self
            .user_state
            .get(&session.app_name)
            .and_then(|users| users.get(&session.user_id))
        {
            session.state.extend(user.clone());
        }
        session
    }
}

/// Session service keeping everything in memory.
///
/// All store and overlay writes go through one lock, so two sessions writing
/// the same app-scoped key are serialized.
#[derive(Debug, Default)]
pub struct InMemorySessionService {
    store: RwLock<Store>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.store
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.store
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn not_found(app_name: &str, user_id: &str, session_id: &str) -> KestrelError {
    KestrelError::SessionNotFound {
        app_name: app_name.to_string(),
        user_id: user_id.to_string(),
        session_id: session_id.to_string(),
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<StateMap>,
        session_id: Option<String>,
    ) -> Result<Session> {
        let id = session_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut store = self.write();
        if store.session_mut(app_name, user_id, &id).is_some() {
            return Err(KestrelError::SessionAlreadyExists(id));
        }

        let mut scoped = ScopedDelta::split(state.iter().flatten());
        store.write_overlays(app_name, user_id, &mut scoped);

        let mut session = Session::new(app_name, user_id, id.clone());
        session.state = scoped.session;
        store
            .sessions
            .entry(app_name.to_string())
            .or_default()
            .entry(user_id.to_string())
            .or_default()
            .insert(id.clone(), session.clone());

        tracing::debug!(app_name, user_id, session_id = %id, "session created");
        Ok(store.merged(&session))
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: &GetSessionConfig,
    ) -> Result<Option<Session>> {
        let store = self.read();
        let Some(stored) = store
            .sessions
            .get(app_name)
            .and_then(|users| users.get(user_id))
            .and_then(|sessions| sessions.get(session_id))
        else {
            return Ok(None);
        };
        let mut session = store.merged(stored);
        config.apply(&mut session.events);
        Ok(Some(session))
    }

    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<Vec<Session>> {
        let store = self.read();
        let mut sessions: Vec<Session> = store
            .sessions
            .get(app_name)
            .and_then(|users| users.get(user_id))
            .map(|sessions| {
                sessions
                    .values()
                    .map(|stored| {
                        let mut session = store.merged(stored);
                        session.events.clear();
                        session
                    })
                    .collect()
            })
            .unwrap_or_default();
        sessions.sort_by(|a, b| a.last_update_time.cmp(&b.last_update_time));
        Ok(sessions)
    }

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<()> {
        let mut store = self.write();
        let removed = store
            .sessions
            .get_mut(app_name)
            .and_then(|users| users.get_mut(user_id))
            .and_then(|sessions| sessions.remove(session_id));
        if removed.is_none() {
            return Err(not_found(app_name, user_id, session_id));
        }
        Ok(())
    }

    async fn update_session(&self, session: &Session) -> Result<()> {
        let mut store = self.write();
        let Some(stored) = store.session_mut(&session.app_name, &session.user_id, &session.id)
        else {
            return Err(not_found(&session.app_name, &session.user_id, &session.id));
        };
        // `session.state` is a merged read view; its overlay keys may be stale.
        stored.state = ScopedDelta::split(&session.state).session;
        stored.events = session.events.clone();
        stored.last_update_time = session.last_update_time;
        Ok(())
    }

    async fn append_event(&self, session: &mut Session, event: Event) -> Result<Event> {
        if event.is_partial() {
            return Ok(event);
        }
        let mut store = self.write();
        if store
            .session_mut(&session.app_name, &session.user_id, &session.id)
            .is_none()
        {
            return Err(not_found(&session.app_name, &session.user_id, &session.id));
        }
        let event = session.apply_event(event);

        let mut scoped = ScopedDelta::split(&event.actions.state_delta);
        store.write_overlays(&session.app_name, &session.user_id, &mut scoped);

        let Some(stored) = store.session_mut(&session.app_name, &session.user_id, &session.id)
        else {
            return Err(not_found(&session.app_name, &session.user_id, &session.id));
        };
        stored.state.extend(scoped.session);
        stored.events.push(event.clone());
        stored.last_update_time = event.timestamp;

        tracing::debug!(
            session_id = %session.id,
            event_id = %event.id,
            author = %event.author,
            delta_keys = event.actions.state_delta.len(),
            "event appended"
        );
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_routes_initial_state_by_prefix() {
        let service = InMemorySessionService::new();
        let state = StateMap::from([
            ("app_mode".to_string(), json!("dark")),
            ("temp_scratch".to_string(), json!(1)),
            ("cart".to_string(), json!([])),
        ]);
        let session = service
            .create_session("shop", "alice", Some(state), Some("s1".into()))
            .await
            .unwrap();
        assert_eq!(session.state["app_mode"], json!("dark"));
        assert!(!session.state.contains_key("temp_scratch"));

        let other = service
            .create_session("shop", "bob", None, None)
            .await
            .unwrap();
        assert_eq!(other.state["app_mode"], json!("dark"));
        assert!(!other.state.contains_key("cart"));
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let service = InMemorySessionService::new();
        service
            .create_session("shop", "alice", None, Some("s1".into()))
            .await
            .unwrap();
        let err = service
            .create_session("shop", "alice", None, Some("s1".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, KestrelError::SessionAlreadyExists(id) if id == "s1"));
    }

    #[tokio::test]
    async fn get_session_filters_recent_events() {
        let service = InMemorySessionService::new();
        let mut session = service
            .create_session("shop", "alice", None, None)
            .await
            .unwrap();
        for author in ["user", "agent", "user"] {
            service
                .append_event(&mut session, Event::new("inv", author))
                .await
                .unwrap();
        }
        let config = GetSessionConfig {
            num_recent_events: Some(2),
            ..Default::default()
        };
        let loaded = service
            .get_session("shop", "alice", &session.id, &config)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.events.len(), 2);
        assert_eq!(loaded.events[0].author, "agent");
    }

    #[tokio::test]
    async fn append_to_unknown_session_fails() {
        let service = InMemorySessionService::new();
        let mut session = Session::new("shop", "alice", "ghost");
        let err = service
            .append_event(&mut session, Event::new("inv", "agent"))
            .await
            .unwrap_err();
        assert!(matches!(err, KestrelError::SessionNotFound { .. }));
    }
}

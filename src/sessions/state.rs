//! Scoped key/value session state.
//!
//! Key prefixes select where a write lands:
//!
//! | prefix             | scope                                   |
//! |--------------------|-----------------------------------------|
//! | `app_`             | every session of the app                |
//! | `user_`            | every session of the (app, user) pair   |
//! | `temp_` / `_temp_` | current turn's working copy, never stored |
//! | anything else      | this session only                       |

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use strum::Display;

pub const APP_PREFIX: &str = "app_";
pub const USER_PREFIX: &str = "user_";
pub const TEMP_PREFIX: &str = "temp_";
pub const LEGACY_TEMP_PREFIX: &str = "_temp_";

/// Raw state storage.
pub type StateMap = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StateScope {
    App,
    User,
    Temp,
    Session,
}

impl StateScope {
    /// Scope selected by a key's prefix.
    pub fn of(key: &str) -> Self {
        if key.starts_with(TEMP_PREFIX) || key.starts_with(LEGACY_TEMP_PREFIX) {
            Self::Temp
        } else if key.starts_with(APP_PREFIX) {
            Self::App
        } else if key.starts_with(USER_PREFIX) {
            Self::User
        } else {
            Self::Session
        }
    }
}

pub fn is_temp_key(key: &str) -> bool {
    StateScope::of(key) == StateScope::Temp
}

/// A state delta split by destination store. Temp keys are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopedDelta {
    pub app: StateMap,
    pub user: StateMap,
    pub session: StateMap,
}

impl ScopedDelta {
    pub fn split<'a>(delta: impl IntoIterator<Item = (&'a String, &'a serde_json::Value)>) -> Self {
        let mut scoped = Self::default();
        for (key, value) in delta {
            let target = match StateScope::of(key) {
                StateScope::Temp => continue,
                StateScope::App => &mut scoped.app,
                StateScope::User => &mut scoped.user,
                StateScope::Session => &mut scoped.session,
            };
            target.insert(key.clone(), value.clone());
        }
        scoped
    }
}

/// A state snapshot with pending writes layered on top.
///
/// Reads see pending writes first. Writes only touch the delta, which the
/// owner later attaches to an event so it reaches the session store.
#[derive(Debug, Clone, Default)]
pub struct State {
    value: StateMap,
    delta: StateMap,
}

impl State {
    pub fn new(value: StateMap) -> Self {
        Self {
            value,
            delta: StateMap::new(),
        }
    }

    pub fn with_delta(value: StateMap, delta: StateMap) -> Self {
        Self { value, delta }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.delta.get(key).or_else(|| self.value.get(key))
    }

    /// Deserialize a value; `None` when missing or of the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.delta.contains_key(key) || self.value.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.delta.insert(key.into(), value);
    }

    pub fn delta(&self) -> &StateMap {
        &self.delta
    }

    pub fn has_delta(&self) -> bool {
        !self.delta.is_empty()
    }

    pub fn into_delta(self) -> StateMap {
        self.delta
    }

    /// Snapshot merged with pending writes.
    pub fn to_map(&self) -> StateMap {
        let mut merged = self.value.clone();
        merged.extend(self.delta.clone());
        merged
    }
}

//! Event model: durable conversation steps and their side effects.

pub mod actions;
pub mod event;

pub use actions::EventActions;
pub use event::{Event, USER_AUTHOR};

use crate::error::{KestrelError, Result};
use crate::types::{Content, Role};

/// Merge function-result events from one dispatch into a single event.
///
/// Parts are concatenated in call order, actions are merged, and the first
/// event's author, branch, invocation id and timestamp are kept.
pub fn merge_function_response_events(events: Vec<Event>) -> Result<Event> {
    let mut events = events.into_iter();
    let Some(mut merged) = events.next() else {
        return Err(KestrelError::InvalidArgument(
            "no function response events to merge".to_string(),
        ));
    };

    let mut rest = events.peekable();
    if rest.peek().is_none() {
        return Ok(merged);
    }

    let mut parts = merged
        .response
        .content
        .take()
        .map(|content| content.parts)
        .unwrap_or_default();
    for event in rest {
        if let Some(content) = event.response.content {
            parts.extend(content.parts);
        }
        merged.actions.merge(event.actions);
    }
    merged.id = Event::new_id();
    merged.response.content = Some(Content::new(Role::User, parts));
    Ok(merged)
}

//! Session state store: transcripts plus scoped key/value state.

pub mod in_memory;
pub mod service;
pub mod session;
pub mod state;

pub use in_memory::InMemorySessionService;
pub use service::{GetSessionConfig, SessionService};
pub use session::Session;
pub use state::{State, StateMap, StateScope};

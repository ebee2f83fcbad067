//! Kestrel: turn-execution engine for LLM agents.
//!
//! An invocation runs an agent tree over a stored session: each step builds a
//! model request from the agent and the transcript, calls the model, dispatches
//! any function calls the model emitted and records everything as events whose
//! state deltas land in scoped session state.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use futures::StreamExt;
//! use kestrel::prelude::*;
//!
//! # async fn example(model: Arc<dyn Llm>) -> kestrel::error::Result<()> {
//! let agent = LlmAgent::builder()
//!     .name("assistant")
//!     .model(model)
//!     .instruction("Answer briefly.")
//!     .build();
//! let sessions = Arc::new(InMemorySessionService::new());
//! let session = sessions.create_session("demo", "u1", None, None).await?;
//! let runner = Runner::new("demo", Arc::new(agent), sessions)?;
//!
//! let mut events = runner.run_async("u1", session.id, Content::user("Hi!"), RunConfig::default());
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event?.content());
//! }
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod auth;
pub mod code_executors;
pub mod config;
pub mod error;
pub mod events;
pub mod flows;
pub mod models;
pub mod planners;
pub mod prelude;
pub mod runner;
pub mod sessions;
pub mod tools;
pub mod types;

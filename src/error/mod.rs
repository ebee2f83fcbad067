//! Error types for Kestrel.

use thiserror::Error;

/// Primary error type for all Kestrel operations.
#[derive(Error, Debug)]
pub enum KestrelError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model error: {model}: {message}")]
    Model { model: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Last event must not be partial; output-length limit likely exceeded")]
    PartialLastEvent,

    #[error("Max number of llm calls limit of {0} exceeded")]
    LlmCallsLimitExceeded(usize),

    #[error("Context variable not found: `{0}`")]
    MissingContextVariable(String),

    #[error("Session not found: {app_name}/{user_id}/{session_id}")]
    SessionNotFound {
        app_name: String,
        user_id: String,
        session_id: String,
    },

    #[error("Session already exists: {0}")]
    SessionAlreadyExists(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed model output or an unresolvable tool/agent name.
    Protocol,
    /// Bad input that the caller can fix.
    Validation,
    /// Invariant violation; the turn cannot continue.
    Fatal,
    /// A configured per-invocation limit was reached.
    Limit,
    Configuration,
    Storage,
    ToolExecution,
    Model,
    Unknown,
}

impl KestrelError {
    /// Create a model-boundary error.
    pub fn model(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Model {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool_execution(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ToolNotFound(_) | Self::AgentNotFound(_) | Self::Serialization(_) => {
                ErrorCategory::Protocol
            }
            Self::InvalidArgument(_) | Self::MissingContextVariable(_) => ErrorCategory::Validation,
            Self::PartialLastEvent | Self::InvalidState(_) => ErrorCategory::Fatal,
            Self::LlmCallsLimitExceeded(_) => ErrorCategory::Limit,
            Self::Configuration(_) | Self::ConfigParse(_) => ErrorCategory::Configuration,
            Self::SessionNotFound { .. } | Self::SessionAlreadyExists(_) | Self::Io(_) => {
                ErrorCategory::Storage
            }
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Model { .. } => ErrorCategory::Model,
        }
    }

    /// Whether the error signals a broken invariant rather than a recoverable failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self.category(), ErrorCategory::Fatal)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, KestrelError>;

//! Configuration system (layered: defaults < config file < environment).

pub mod run_config;

pub use run_config::{RunConfig, DEFAULT_MAX_LLM_CALLS};

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{KestrelError, Result};
use crate::types::StreamingMode;

/// File looked up in the working directory before the per-user config.
pub const LOCAL_CONFIG_FILE: &str = "kestrel.toml";

pub const STREAMING_MODE_ENV: &str = "KESTREL_STREAMING_MODE";
pub const MAX_LLM_CALLS_ENV: &str = "KESTREL_MAX_LLM_CALLS";

/// Engine-wide defaults for new invocations.
///
/// ```toml
/// streaming_mode = "sse"
/// max_llm_calls = 50
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub streaming_mode: StreamingMode,
    pub max_llm_calls: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let run = RunConfig::default();
        Self {
            streaming_mode: run.streaming_mode,
            max_llm_calls: run.max_llm_calls,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Per-user config path (`$XDG_CONFIG_HOME/kestrel/config.toml` on Linux).
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "kestrel").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load `.env`, then the first config file found, then environment overrides.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        let file = if local.is_file() {
            Some(local)
        } else {
            Self::default_path().filter(|path| path.is_file())
        };
        let config = match file {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading engine config");
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        config.apply_env()
    }

    /// Override fields from `KESTREL_*` environment variables.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(raw) = std::env::var(STREAMING_MODE_ENV) {
            self.streaming_mode = raw.trim().parse().map_err(|_| {
                KestrelError::Configuration(format!(
                    "{STREAMING_MODE_ENV} must be one of none, sse, bidi (got `{raw}`)"
                ))
            })?;
        }
        if let Ok(raw) = std::env::var(MAX_LLM_CALLS_ENV) {
            self.max_llm_calls = raw.trim().parse().map_err(|_| {
                KestrelError::Configuration(format!(
                    "{MAX_LLM_CALLS_ENV} must be a non-negative integer (got `{raw}`)"
                ))
            })?;
        }
        Ok(self)
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            streaming_mode: self.streaming_mode,
            max_llm_calls: self.max_llm_calls,
        }
    }
}

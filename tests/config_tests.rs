//! Tests for engine configuration loading.

use std::io::Write;
use std::sync::{Mutex, OnceLock};

use kestrel::config::{EngineConfig, RunConfig, MAX_LLM_CALLS_ENV, STREAMING_MODE_ENV};
use kestrel::error::{ErrorCategory, KestrelError};
use kestrel::types::StreamingMode;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 2] = [STREAMING_MODE_ENV, MAX_LLM_CALLS_ENV];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn clear_config_env() -> EnvGuard {
    let guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    for key in CONFIG_ENV_VARS {
        std::env::remove_var(key);
    }
    guard
}

#[test]
fn apply_env_without_variables_keeps_values() {
    let _lock = env_lock_guard();
    let _env = clear_config_env();

    let config = EngineConfig {
        streaming_mode: StreamingMode::Sse,
        max_llm_calls: 12,
    };
    assert_eq!(config.clone().apply_env().unwrap(), config);
}

#[test]
fn apply_env_overrides_file_values() {
    let _lock = env_lock_guard();
    let _env = clear_config_env();
    std::env::set_var(STREAMING_MODE_ENV, "SSE");
    std::env::set_var(MAX_LLM_CALLS_ENV, " 3 ");

    let config = EngineConfig::default().apply_env().unwrap();

    assert_eq!(config.streaming_mode, StreamingMode::Sse);
    assert_eq!(config.max_llm_calls, 3);
}

#[test]
fn invalid_streaming_mode_is_a_configuration_error() {
    let _lock = env_lock_guard();
    let _env = clear_config_env();
    std::env::set_var(STREAMING_MODE_ENV, "websocket");

    let err = EngineConfig::default().apply_env().unwrap_err();

    assert!(matches!(err, KestrelError::Configuration(ref message) if message.contains("websocket")));
    assert_eq!(err.category(), ErrorCategory::Configuration);
}

#[test]
fn negative_call_limit_is_rejected() {
    let _lock = env_lock_guard();
    let _env = clear_config_env();
    std::env::set_var(MAX_LLM_CALLS_ENV, "-1");

    let err = EngineConfig::default().apply_env().unwrap_err();

    assert!(matches!(err, KestrelError::Configuration(_)));
}

#[test]
fn from_file_reads_toml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "streaming_mode = \"bidi\"").unwrap();
    writeln!(file, "max_llm_calls = 0").unwrap();

    let config = EngineConfig::from_file(file.path()).unwrap();
    let run = config.run_config();

    assert_eq!(run.streaming_mode, StreamingMode::Bidi);
    assert_eq!(run.max_llm_calls, 0);
    assert!(!run.exceeds_llm_call_limit(10_000));
}

#[test]
fn missing_file_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = EngineConfig::from_file(dir.path().join("absent.toml")).unwrap_err();

    assert!(matches!(err, KestrelError::Io(_)));
}

#[test]
fn run_config_defaults_match_engine_defaults() {
    assert_eq!(EngineConfig::default().run_config(), RunConfig::default());
    assert_eq!(RunConfig::default().streaming_mode, StreamingMode::None);
}

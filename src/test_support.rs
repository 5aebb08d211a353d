use crate::config::{BackendKind, Config};
use tokio::sync::Mutex as AsyncMutex;

/// Process-wide lock for tests that mutate environment variables.
/// Use `.blocking_lock()` in sync tests and `.lock().await` in async tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// A valid configuration pointing at local endpoints, independent of the
/// environment.
pub fn test_config() -> Config {
    Config {
        backend: BackendKind::Chat,
        api_key: Some("test-key".to_string()),
        model: "gpt-4".to_string(),
        api_url: "http://localhost:8000/v1/chat/completions".to_string(),
        completion_url: "http://localhost:8080/v1/completions".to_string(),
        temperature: 0.001,
        auto_run: false,
        debug: false,
        max_tool_rounds: None,
        max_tokens: 1_000,
        exec_timeout_secs: 30,
        fallback_language: "python".to_string(),
        working_dir: std::env::temp_dir(),
    }
}

use codeloop::config::{BackendKind, Cli, Config};
use std::path::PathBuf;

fn local_config() -> Config {
    Config {
        backend: BackendKind::Chat,
        api_key: None,
        model: "gpt-4".to_string(),
        api_url: "http://localhost:8000/v1/chat/completions".to_string(),
        completion_url: "http://127.0.0.1:8080/v1/completions".to_string(),
        temperature: 0.001,
        auto_run: false,
        debug: false,
        max_tool_rounds: None,
        max_tokens: 1_000,
        exec_timeout_secs: 120,
        fallback_language: "python".to_string(),
        working_dir: PathBuf::from("."),
    }
}

#[test]
fn test_config_validation_allows_local_endpoint_without_api_key() {
    assert!(local_config().validate().is_ok());
}

#[test]
fn test_config_validation_requires_api_key_for_remote_chat() {
    let config = Config {
        api_url: "https://api.openai.com/v1/chat/completions".to_string(),
        ..local_config()
    };
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("OPENAI_API_KEY"));

    let with_key = Config {
        api_key: Some("sk-test".to_string()),
        ..config
    };
    assert!(with_key.validate().is_ok());
}

#[test]
fn test_config_validation_checks_the_active_endpoint() {
    let config = Config {
        backend: BackendKind::Completion,
        api_url: "not a url".to_string(),
        ..local_config()
    };
    assert!(config.validate().is_ok());

    let config = Config {
        completion_url: "ftp://localhost/v1/completions".to_string(),
        ..config
    };
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("CODELOOP_COMPLETION_URL"));
}

#[test]
fn test_config_validation_rejects_bad_values() {
    let cases = [
        Config {
            model: "  ".to_string(),
            ..local_config()
        },
        Config {
            fallback_language: "cobol".to_string(),
            ..local_config()
        },
        Config {
            exec_timeout_secs: 0,
            ..local_config()
        },
        Config {
            max_tokens: 0,
            ..local_config()
        },
    ];
    for config in cases {
        assert!(config.validate().is_err(), "{config:?}");
    }
}

#[test]
fn test_cli_flags_override_config() {
    let mut config = local_config();
    let cli = Cli {
        message: Some("hi".to_string()),
        auto_run: true,
        debug: false,
        local: true,
        backend: None,
        model: Some("llama".to_string()),
        max_tool_rounds: Some(3),
    };
    config.apply_cli(&cli);

    assert_eq!(config.backend, BackendKind::Completion);
    assert!(config.auto_run);
    assert!(!config.debug);
    assert_eq!(config.model, "llama");
    assert_eq!(config.max_tool_rounds, Some(3));
    assert_eq!(config.endpoint().0, "CODELOOP_COMPLETION_URL");
}

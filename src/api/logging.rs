use crate::state::message::{AssistantMessage, Message};
use crate::util::{env_nonempty, parse_bool_flag};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::{IsTerminal, Write};

const DEBUG_PAYLOAD_ENV: &str = "CODELOOP_DEBUG_PAYLOAD";
const API_LOG_PATH_ENV: &str = "CODELOOP_API_LOG_PATH";
const DEFAULT_API_LOG_PATH: &str = "/tmp/codeloop-api.log";

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .and_then(parse_bool_flag)
        .unwrap_or(false)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    let message = format!(
        "CODELOOP_API DEBUG payload_request url={request_url}\npayload:\n{formatted_payload}\n"
    );
    emit_log_message(&message);
}

pub fn emit_debug_messages(messages: &[Message]) {
    let formatted = serde_json::to_string_pretty(messages)
        .unwrap_or_else(|_| "<messages serialization error>".to_string());
    emit_log_message(&format!("CODELOOP DEBUG messages:\n{formatted}\n"));
}

pub fn emit_debug_prompt(prompt: &str) {
    emit_log_message(&format!("CODELOOP DEBUG prompt:\n{prompt}\n"));
}

pub fn emit_debug_function_call(message: &AssistantMessage) {
    let formatted = serde_json::to_string_pretty(&message.function_call)
        .unwrap_or_else(|_| "<function call serialization error>".to_string());
    emit_log_message(&format!("CODELOOP DEBUG function_call:\n{formatted}\n"));
}

pub fn emit_sse_parse_error(json_data: &str, parse_error: &serde_json::Error) {
    let message =
        format!("CODELOOP_API ERROR sse_parse_failed error={parse_error}\ndata:\n{json_data}\n");
    emit_log_message(&message);
}

fn emit_log_message(message: &str) {
    if let Some(path) = resolve_log_path() {
        if append_log_file(&path, message).is_ok() {
            return;
        }
    }

    eprintln!("{message}");
}

/// Interactive sessions log to a file so records do not tear the terminal.
fn resolve_log_path() -> Option<String> {
    env_nonempty(API_LOG_PATH_ENV)
        .map(|path| path.trim().to_string())
        .or_else(|| {
            if std::io::stderr().is_terminal() {
                Some(DEFAULT_API_LOG_PATH.to_string())
            } else {
                None
            }
        })
}

fn append_log_file(path: &str, message: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(message.as_bytes())
}

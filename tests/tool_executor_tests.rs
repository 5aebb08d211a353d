use codeloop::tools::{
    CodeExecutor, ExecutorRegistry, Language, ProcessExecutor, MAX_OUTPUT_CHARS,
};
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;

fn bash_available() -> bool {
    Command::new("bash")
        .arg("-c")
        .arg("true")
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn python_available() -> bool {
    Command::new("python3")
        .arg("-c")
        .arg("pass")
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn shell_executor(temp: &TempDir) -> ProcessExecutor {
    ProcessExecutor::new(
        Language::Shell,
        temp.path().to_path_buf(),
        Duration::from_secs(20),
    )
}

#[tokio::test]
async fn test_shell_session_keeps_state_between_runs() {
    if !bash_available() {
        return;
    }
    let temp = TempDir::new().expect("temp dir");
    let mut executor = shell_executor(&temp);
    let mut lines = Vec::new();

    let first = executor
        .execute("GREETING=hello", &mut |line: &str| lines.push(line.to_string()))
        .await
        .expect("first run");
    assert_eq!(first, "");

    let second = executor
        .execute("echo $GREETING", &mut |line: &str| lines.push(line.to_string()))
        .await
        .expect("second run");
    assert_eq!(second, "hello");
    assert_eq!(lines, vec!["hello".to_string()]);
}

#[tokio::test]
async fn test_shell_output_without_trailing_newline_completes() {
    if !bash_available() {
        return;
    }
    let temp = TempDir::new().expect("temp dir");
    let mut executor = shell_executor(&temp);
    let mut lines = Vec::new();

    executor
        .execute("X=kept", &mut |_: &str| {})
        .await
        .expect("assignment");
    let output = executor
        .execute("printf hi", &mut |line: &str| lines.push(line.to_string()))
        .await
        .expect("printf run");
    assert_eq!(output, "hi");
    assert_eq!(lines, vec!["hi".to_string()]);

    let output = executor
        .execute("printf oops >&2", &mut |_: &str| {})
        .await
        .expect("stderr run");
    assert_eq!(output, "oops");

    let output = executor
        .execute("echo $X", &mut |_: &str| {})
        .await
        .expect("session survives");
    assert_eq!(output, "kept");
}

#[tokio::test]
async fn test_python_output_without_trailing_newline_completes() {
    if !python_available() {
        return;
    }
    let temp = TempDir::new().expect("temp dir");
    let mut executor = ProcessExecutor::new(
        Language::Python,
        temp.path().to_path_buf(),
        Duration::from_secs(20),
    );

    executor
        .execute("x = 41", &mut |_: &str| {})
        .await
        .expect("assignment");
    let output = executor
        .execute("print('hi', end='')", &mut |_: &str| {})
        .await
        .expect("print run");
    assert_eq!(output, "hi");

    let output = executor
        .execute("x + 1", &mut |_: &str| {})
        .await
        .expect("session survives");
    assert_eq!(output, "42");
}

#[tokio::test]
async fn test_shell_runs_in_working_dir_and_reports_stderr() {
    if !bash_available() {
        return;
    }
    let temp = TempDir::new().expect("temp dir");
    std::fs::write(temp.path().join("marker.txt"), "x").expect("write marker");
    let mut executor = shell_executor(&temp);

    let output = executor
        .execute("ls\nls does-not-exist", &mut |_: &str| {})
        .await
        .expect("run");
    assert!(output.contains("marker.txt"));
    assert!(output.contains("does-not-exist"));
}

#[tokio::test]
async fn test_long_output_is_truncated_to_tail() {
    if !bash_available() {
        return;
    }
    let temp = TempDir::new().expect("temp dir");
    let mut executor = shell_executor(&temp);

    let output = executor
        .execute("for i in $(seq 1 2000); do echo line$i; done", &mut |_: &str| {})
        .await
        .expect("run");
    assert!(output.starts_with("Output truncated."));
    assert!(output.ends_with("line2000"));
    assert!(output.chars().count() < MAX_OUTPUT_CHARS + 100);
}

#[tokio::test]
async fn test_session_restarts_after_exit() {
    if !bash_available() {
        return;
    }
    let temp = TempDir::new().expect("temp dir");
    let mut executor = shell_executor(&temp);

    executor
        .execute("X=1\nexit 0", &mut |_: &str| {})
        .await
        .expect("exit run");
    let output = executor
        .execute("echo \"x=$X\"", &mut |_: &str| {})
        .await
        .expect("run after exit");
    assert_eq!(output, "x=");
}

#[tokio::test]
async fn test_timeout_restarts_session() {
    if !bash_available() {
        return;
    }
    let temp = TempDir::new().expect("temp dir");
    let mut executor = ProcessExecutor::new(
        Language::Shell,
        temp.path().to_path_buf(),
        Duration::from_millis(300),
    );

    let err = executor
        .execute("echo started\nsleep 5", &mut |_: &str| {})
        .await
        .expect_err("should time out");
    let text = format!("{err:#}");
    assert!(text.contains("started"));
    assert!(text.contains("timed out"));
}

#[tokio::test]
async fn test_registry_rejects_unknown_language() {
    let temp = TempDir::new().expect("temp dir");
    let mut registry =
        ExecutorRegistry::with_processes(temp.path().to_path_buf(), Duration::from_secs(5));

    let err = registry
        .get_or_create("cobol")
        .err()
        .expect("unknown language should fail");
    assert!(err.to_string().contains("Unsupported language: cobol"));
    assert!(registry.is_empty());
}

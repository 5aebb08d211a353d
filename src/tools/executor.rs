use crate::util::tail_chars;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;

/// Printed on stdout and stderr by every driver once a run is complete.
pub const END_MARKER: &str = "__CODELOOP_END_OF_EXECUTION__";
pub const MAX_OUTPUT_CHARS: usize = 2_000;

/// Receives each output line of a run as it appears.
pub type OutputSink<'a> = dyn for<'s> FnMut(&'s str) + Send + 'a;

/// Runs code for one language, keeping interpreter state between runs.
#[async_trait]
pub trait CodeExecutor: Send {
    /// Runs `code`, forwarding each output line as it appears, and returns the
    /// collected output.
    async fn execute(
        &mut self,
        code: &str,
        on_output: &mut OutputSink<'_>,
    ) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Shell,
    JavaScript,
    AppleScript,
}

impl Language {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Some(Self::Python),
            "shell" | "bash" | "sh" | "zsh" => Some(Self::Shell),
            "javascript" | "js" | "node" => Some(Self::JavaScript),
            "applescript" | "osascript" => Some(Self::AppleScript),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Shell => "shell",
            Self::JavaScript => "javascript",
            Self::AppleScript => "applescript",
        }
    }

    fn interpreter(self) -> (&'static str, Vec<&'static str>) {
        match self {
            Self::Python => ("python3", vec!["-u", "-c", PYTHON_DRIVER]),
            Self::Shell => ("bash", Vec::new()),
            Self::JavaScript => ("node", vec!["-e", JAVASCRIPT_DRIVER]),
            Self::AppleScript => ("osascript", Vec::new()),
        }
    }

    /// What gets written to the session's stdin for one run.
    fn session_input(self, code: &str) -> Result<String> {
        match self {
            Self::Shell => Ok(format!(
                "{code}\necho {END_MARKER}\necho {END_MARKER} >&2\n"
            )),
            Self::Python | Self::JavaScript => {
                let line = serde_json::to_string(code).context("Failed to encode code")?;
                Ok(format!("{line}\n"))
            }
            Self::AppleScript => bail!("applescript runs without a session"),
        }
    }
}

const PYTHON_DRIVER: &str = r#"
import ast, json, sys, traceback

_MARKER = "__CODELOOP_END_OF_EXECUTION__"
_namespace = {"__name__": "__main__"}

def _run(source):
    tree = ast.parse(source, "<code>", "exec")
    tail = None
    if tree.body and isinstance(tree.body[-1], ast.Expr):
        tail = ast.Expression(tree.body.pop().value)
    exec(compile(tree, "<code>", "exec"), _namespace)
    if tail is not None:
        value = eval(compile(tail, "<code>", "eval"), _namespace)
        if value is not None:
            print(repr(value))

for _line in sys.stdin:
    try:
        _run(json.loads(_line))
    except SystemExit:
        pass
    except BaseException:
        traceback.print_exc()
    sys.stdout.flush()
    print(_MARKER, flush=True)
    print(_MARKER, file=sys.stderr, flush=True)
"#;

const JAVASCRIPT_DRIVER: &str = r#"
const readline = require("readline");
const vm = require("vm");
const MARKER = "__CODELOOP_END_OF_EXECUTION__";
const context = vm.createContext({
  require, console, process, Buffer,
  setTimeout, clearTimeout, setInterval, clearInterval,
});
readline.createInterface({ input: process.stdin }).on("line", (line) => {
  try {
    const value = vm.runInContext(JSON.parse(line), context, { filename: "<code>" });
    if (value !== undefined) console.log(value);
  } catch (error) {
    console.error(error && error.stack ? error.stack : String(error));
  }
  process.stdout.write(MARKER + "\n");
  process.stderr.write(MARKER + "\n");
});
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputStream {
    Stdout,
    Stderr,
}

struct OutputLine {
    stream: OutputStream,
    text: String,
}

enum RunEnd {
    /// Both end markers arrived; the session can be reused.
    Complete,
    /// The interpreter exited before finishing.
    Exited,
}

struct ProcessSession {
    _child: Child,
    stdin: ChildStdin,
    lines: mpsc::UnboundedReceiver<OutputLine>,
}

impl ProcessSession {
    fn spawn(language: Language, working_dir: &Path) -> Result<Self> {
        let (program, args) = language.interpreter();
        let mut child = Command::new(program)
            .args(&args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {program} for {}", language.name()))?;

        let stdin = child.stdin.take().context("Failed to get interpreter stdin")?;
        let stdout = child.stdout.take().context("Failed to get interpreter stdout")?;
        let stderr = child.stderr.take().context("Failed to get interpreter stderr")?;

        let (tx, lines) = mpsc::unbounded_channel();
        spawn_line_reader(stdout, OutputStream::Stdout, tx.clone());
        spawn_line_reader(stderr, OutputStream::Stderr, tx);

        Ok(Self {
            _child: child,
            stdin,
            lines,
        })
    }

    async fn send(&mut self, input: &str) -> std::io::Result<()> {
        self.stdin.write_all(input.as_bytes()).await?;
        self.stdin.flush().await
    }

    async fn collect_run(
        &mut self,
        output: &mut String,
        on_output: &mut OutputSink<'_>,
    ) -> RunEnd {
        let mut stdout_done = false;
        let mut stderr_done = false;
        while !(stdout_done && stderr_done) {
            let Some(line) = self.lines.recv().await else {
                return RunEnd::Exited;
            };
            // Output without a trailing newline leaves the marker glued to
            // its last line.
            if let Some(rest) = line.text.trim_end().strip_suffix(END_MARKER) {
                match line.stream {
                    OutputStream::Stdout => stdout_done = true,
                    OutputStream::Stderr => stderr_done = true,
                }
                if !rest.is_empty() {
                    push_line(output, on_output, rest);
                }
                continue;
            }
            push_line(output, on_output, &line.text);
        }
        RunEnd::Complete
    }
}

fn push_line(output: &mut String, on_output: &mut OutputSink<'_>, text: &str) {
    on_output(text);
    output.push_str(text);
    output.push('\n');
}

fn spawn_line_reader<R>(reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(text)) = lines.next_line().await {
            if tx.send(OutputLine { stream, text }).is_err() {
                break;
            }
        }
    });
}

/// Executor backed by a long-running interpreter process.
///
/// The process is started on first use and restarted after it exits or a run
/// times out, which loses its state.
pub struct ProcessExecutor {
    language: Language,
    working_dir: PathBuf,
    timeout: Duration,
    session: Option<ProcessSession>,
}

impl ProcessExecutor {
    pub fn new(language: Language, working_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            language,
            working_dir,
            timeout,
            session: None,
        }
    }

    async fn run_one_shot(
        &self,
        code: &str,
        on_output: &mut OutputSink<'_>,
    ) -> Result<String> {
        let (program, _) = self.language.interpreter();
        let mut command = Command::new(program);
        command
            .arg("-e")
            .arg(code)
            .current_dir(&self.working_dir)
            .kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| anyhow!("Execution timed out after {}s", self.timeout.as_secs()))?
            .with_context(|| format!("Failed to start {program}"))?;

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        for line in text.lines() {
            on_output(line);
        }
        Ok(truncate_output(text.trim_end()))
    }
}

#[async_trait]
impl CodeExecutor for ProcessExecutor {
    async fn execute(
        &mut self,
        code: &str,
        on_output: &mut OutputSink<'_>,
    ) -> Result<String> {
        if self.language == Language::AppleScript {
            return self.run_one_shot(code, on_output).await;
        }

        let input = self.language.session_input(code)?;
        if self.session.is_none() {
            self.session = Some(ProcessSession::spawn(self.language, &self.working_dir)?);
        }
        let Some(session) = self.session.as_mut() else {
            bail!("{} session is not running", self.language.name());
        };

        if let Err(error) = session.send(&input).await {
            self.session = None;
            return Err(error)
                .with_context(|| format!("{} session stopped accepting input", self.language.name()));
        }

        let mut output = String::new();
        let finished =
            tokio::time::timeout(self.timeout, session.collect_run(&mut output, on_output)).await;
        match finished {
            Ok(RunEnd::Complete) => {}
            Ok(RunEnd::Exited) => self.session = None,
            Err(_) => {
                self.session = None;
                bail!(
                    "{}\nExecution timed out after {}s; the {} session was restarted.",
                    truncate_output(output.trim_end()),
                    self.timeout.as_secs(),
                    self.language.name()
                );
            }
        }

        Ok(truncate_output(output.trim_end()))
    }
}

/// Keeps the tail of long output, which is where errors usually are.
pub fn truncate_output(output: &str) -> String {
    if output.chars().count() <= MAX_OUTPUT_CHARS {
        return output.to_string();
    }
    format!(
        "Output truncated. Showing the last {MAX_OUTPUT_CHARS} characters.\n\n{}",
        tail_chars(output, MAX_OUTPUT_CHARS)
    )
}

mod printer;

pub use printer::StreamPrinter;

use crate::api::build_backend;
use crate::config::Config;
use crate::state::{
    ConversationManager, ConversationStreamUpdate, Message, ToolApprovalRequest, TurnSettings,
};
use crate::tools::ExecutorRegistry;
use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task;
use tokio_util::sync::CancellationToken;

/// REPL commands handled without talking to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LocalCommand {
    Exit,
    ToggleDebug,
    Reset,
    Save(Option<String>),
    Load(Option<String>),
}

fn parse_local_command(input: &str) -> Option<LocalCommand> {
    let input = input.trim();
    if matches!(input, "exit" | "quit" | "%exit" | "%quit") {
        return Some(LocalCommand::Exit);
    }
    let rest = input.strip_prefix('%')?;
    let (name, argument) = match rest.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, Some(argument.trim().to_string())),
        None => (rest, None),
    };
    let argument = argument.filter(|value| !value.is_empty());
    match name {
        "debug" => Some(LocalCommand::ToggleDebug),
        "reset" => Some(LocalCommand::Reset),
        "save" | "save_message" => Some(LocalCommand::Save(argument)),
        "load" | "load_message" => Some(LocalCommand::Load(argument)),
        _ => None,
    }
}

/// Lines typed by the operator, read on a dedicated thread so a pending read
/// never holds up the runtime.
struct InputLines {
    rx: mpsc::UnboundedReceiver<String>,
}

impl InputLines {
    fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            while let Ok(Some(line)) = read_user_line_blocking() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self { rx }
    }

    /// `None` once stdin is closed.
    async fn next_line(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

pub struct App<W: Write = io::Stdout> {
    config: Config,
    conversation: Arc<Mutex<ConversationManager>>,
    printer: StreamPrinter<W>,
    input: InputLines,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let backend = build_backend(&config)?;
        let registry = ExecutorRegistry::with_processes(
            config.working_dir.clone(),
            Duration::from_secs(config.exec_timeout_secs),
        );
        let settings = TurnSettings::from_config(&config);
        let conversation = ConversationManager::new(backend, registry, settings);

        Ok(Self {
            config,
            conversation: Arc::new(Mutex::new(conversation)),
            printer: StreamPrinter::new(),
            input: InputLines::spawn(),
        })
    }
}

impl<W: Write> App<W> {
    /// Runs one turn for `message` when given, otherwise an interactive loop.
    pub async fn run(&mut self, message: Option<String>) -> Result<()> {
        self.printer.print_welcome(&self.config)?;
        if let Some(message) = message {
            return self.run_turn(message).await;
        }

        loop {
            self.printer.print_prompt()?;
            let line = tokio::select! {
                line = self.input.next_line() => line,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                break;
            };
            let content = line.trim();
            if content.is_empty() {
                continue;
            }

            match parse_local_command(content) {
                Some(LocalCommand::Exit) => break,
                Some(command) => {
                    if let Err(err) = self.handle_local_command(command).await {
                        self.printer.print_error(&format!("{err:#}"))?;
                    }
                }
                None => self.run_turn(content.to_string()).await?,
            }
        }
        self.printer.end_turn()?;
        Ok(())
    }

    async fn handle_local_command(&mut self, command: LocalCommand) -> Result<()> {
        match command {
            LocalCommand::Exit => {}
            LocalCommand::ToggleDebug => {
                let mut conversation = self.conversation.lock().await;
                let debug = !conversation.debug();
                conversation.set_debug(debug);
                drop(conversation);
                let state = if debug { "on" } else { "off" };
                self.printer.print_notice(&format!("Debug mode {state}."))?;
            }
            LocalCommand::Reset => {
                self.conversation.lock().await.reset();
                self.printer.print_notice("Session reset.")?;
            }
            LocalCommand::Save(path) => {
                let path = path.context("Usage: %save <path>")?;
                let conversation = self.conversation.lock().await;
                save_messages(Path::new(&path), conversation.messages()).await?;
                let count = conversation.messages().len();
                drop(conversation);
                self.printer
                    .print_notice(&format!("Saved {count} messages to {path}."))?;
            }
            LocalCommand::Load(path) => {
                let path = path.context("Usage: %load <path>")?;
                let messages = load_messages(Path::new(&path)).await?;
                let count = messages.len();
                self.conversation.lock().await.load(messages);
                self.printer
                    .print_notice(&format!("Loaded {count} messages from {path}."))?;
            }
        }
        Ok(())
    }

    /// Streams one turn to the terminal. Ctrl-C interrupts the turn instead of
    /// exiting; an approval prompt interrupted the same way counts as a no.
    async fn run_turn(&mut self, content: String) -> Result<()> {
        let cancel = CancellationToken::new();
        let (update_tx, mut update_rx) = mpsc::unbounded_channel::<ConversationStreamUpdate>();

        let conversation = Arc::clone(&self.conversation);
        let turn_cancel = cancel.clone();
        let turn = task::spawn(async move {
            let mut manager = conversation.lock().await;
            manager
                .send_message(content, Some(&update_tx), &turn_cancel)
                .await
        });

        loop {
            tokio::select! {
                update = update_rx.recv() => match update {
                    Some(ConversationStreamUpdate::ToolApprovalRequest(request)) => {
                        self.handle_tool_approval(request, &cancel).await?;
                    }
                    Some(update) => self.printer.on_update(update)?,
                    None => break,
                },
                _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                    cancel.cancel();
                }
            }
        }

        match turn.await? {
            Ok(summary) => {
                self.printer.end_turn()?;
                self.printer.print_turn_summary(&summary)?;
            }
            Err(err) => {
                self.printer.end_turn()?;
                self.printer.print_error(&format!("{err:#}"))?;
            }
        }
        Ok(())
    }

    async fn handle_tool_approval(
        &mut self,
        request: ToolApprovalRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut response_tx = Some(request.response_tx);
        self.printer.print_approval_prompt()?;

        let answer = tokio::select! {
            line = self.input.next_line() => line,
            _ = cancel.cancelled() => None,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                None
            }
        };
        let approved = answer.as_deref().is_some_and(is_affirmative);
        respond_tool_approval(&mut response_tx, approved);
        Ok(())
    }
}

fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

fn respond_tool_approval(
    response_tx: &mut Option<tokio::sync::oneshot::Sender<bool>>,
    approved: bool,
) {
    if let Some(tx) = response_tx.take() {
        let _ = tx.send(approved);
    }
}

fn read_user_line_blocking() -> Result<Option<String>> {
    let mut input = String::new();
    let bytes = io::stdin().lock().read_line(&mut input)?;
    if bytes == 0 {
        Ok(None)
    } else {
        Ok(Some(input.trim_end_matches(['\r', '\n']).to_string()))
    }
}

async fn save_messages(path: &Path, messages: &[Message]) -> Result<()> {
    let json = serde_json::to_string_pretty(messages)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

async fn load_messages(path: &Path) -> Result<Vec<Message>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("{} is not a saved message list", path.display()))
}

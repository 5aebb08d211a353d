use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::tools::Language;
use crate::util::{env_nonempty, is_local_endpoint_url, parse_bool_flag};

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_COMPLETION_URL: &str = "http://localhost:8080/v1/completions";
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Which kind of backend produces the assistant stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Chat completions with native function calling.
    Chat,
    /// Plain text completions; code is read from fenced blocks.
    Completion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: BackendKind,
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    pub completion_url: String,
    pub temperature: f32,
    pub auto_run: bool,
    pub debug: bool,
    pub max_tool_rounds: Option<usize>,
    pub max_tokens: usize,
    pub exec_timeout_secs: u64,
    pub fallback_language: String,
    pub working_dir: PathBuf,
}

/// Command-line flags. Anything given here wins over the environment.
#[derive(Debug, Default, Parser)]
#[command(
    name = "codeloop",
    version,
    about = "Chat with a model that writes code and runs it on this machine"
)]
pub struct Cli {
    /// Send a single message, print the response, and exit.
    pub message: Option<String>,

    /// Run generated code without asking first.
    #[arg(short = 'y', long)]
    pub auto_run: bool,

    /// Print prompts, function calls and payloads while streaming.
    #[arg(short, long)]
    pub debug: bool,

    /// Use the local text-completion endpoint.
    #[arg(short, long)]
    pub local: bool,

    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    #[arg(long)]
    pub model: Option<String>,

    /// Stop a turn after this many code executions.
    #[arg(long)]
    pub max_tool_rounds: Option<usize>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let backend = match env_nonempty("CODELOOP_BACKEND") {
            Some(value) => <BackendKind as ValueEnum>::from_str(&value, true)
                .map_err(|error| anyhow!("Invalid CODELOOP_BACKEND '{value}': {error}"))?,
            None => BackendKind::Chat,
        };
        let auto_run = std::env::var("CODELOOP_AUTO_RUN")
            .ok()
            .and_then(parse_bool_flag)
            .unwrap_or(false);
        let debug = std::env::var("CODELOOP_DEBUG")
            .ok()
            .and_then(parse_bool_flag)
            .unwrap_or(false);
        let max_tool_rounds = parse_env::<usize>("CODELOOP_MAX_TOOL_ROUNDS")?;
        let max_tokens = parse_env::<usize>("CODELOOP_MAX_TOKENS")?.unwrap_or(1_000);
        let exec_timeout_secs = parse_env::<u64>("CODELOOP_EXEC_TIMEOUT_SECS")?.unwrap_or(120);
        let temperature = parse_env::<f32>("CODELOOP_TEMPERATURE")?.unwrap_or(0.001);

        Ok(Self {
            backend,
            api_key: env_nonempty("OPENAI_API_KEY"),
            model: env_nonempty("CODELOOP_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_url: env_nonempty("CODELOOP_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            completion_url: env_nonempty("CODELOOP_COMPLETION_URL")
                .unwrap_or_else(|| DEFAULT_COMPLETION_URL.to_string()),
            temperature,
            auto_run,
            debug,
            max_tool_rounds,
            max_tokens,
            exec_timeout_secs,
            fallback_language: env_nonempty("CODELOOP_FALLBACK_LANGUAGE")
                .unwrap_or_else(|| "python".to_string()),
            working_dir: std::env::current_dir()?,
        })
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if cli.auto_run {
            self.auto_run = true;
        }
        if cli.debug {
            self.debug = true;
        }
        if cli.local {
            self.backend = BackendKind::Completion;
        }
        if let Some(backend) = cli.backend {
            self.backend = backend;
        }
        if let Some(model) = &cli.model {
            self.model = model.clone();
        }
        if cli.max_tool_rounds.is_some() {
            self.max_tool_rounds = cli.max_tool_rounds;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (url_var, url) = self.endpoint();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("Invalid {url_var} '{url}': expected http:// or https:// URL");
        }

        if self.backend == BackendKind::Chat
            && !is_local_endpoint_url(url)
            && self.api_key.is_none()
        {
            bail!("OPENAI_API_KEY must be set for non-local endpoints (url: '{url}')");
        }

        if self.model.trim().is_empty() {
            bail!("Model name must not be empty");
        }

        if Language::parse(&self.fallback_language).is_none() {
            bail!(
                "Invalid CODELOOP_FALLBACK_LANGUAGE '{}': expected python, shell, javascript or applescript",
                self.fallback_language
            );
        }

        if self.exec_timeout_secs == 0 {
            bail!("CODELOOP_EXEC_TIMEOUT_SECS must be greater than zero");
        }
        if self.max_tokens == 0 {
            bail!("CODELOOP_MAX_TOKENS must be greater than zero");
        }

        Ok(())
    }

    /// Env var name and URL of the endpoint the active backend talks to.
    pub fn endpoint(&self) -> (&'static str, &str) {
        match self.backend {
            BackendKind::Chat => ("CODELOOP_API_URL", &self.api_url),
            BackendKind::Completion => ("CODELOOP_COMPLETION_URL", &self.completion_url),
        }
    }
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_nonempty(name)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("Invalid {name} '{value}'"))
        })
        .transpose()
}

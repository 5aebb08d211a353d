//! Prompt rendering for text-completion backends, plus the system message
//! shared by both backend kinds.

use super::ResponseMode;
use crate::state::conversation::NO_OUTPUT;
use crate::state::message::Message;
use crate::util::env_nonempty;

pub const DEFAULT_SYSTEM_MESSAGE: &str = "\
You are Codeloop, a world-class programmer that can complete any goal by executing code.
First, write a plan. **Always recap the plan between each code block** (you have extreme short-term memory loss, so you need to recap the plan between each message block to retain it).
Execute code in small, informative steps and check the result before moving on. You are capable of **any** task.
When you send a message containing code to run_code, it will be executed **on the user's machine**. The user has given you **full and complete permission** to execute any code necessary to complete the task.
Only use the function you have been provided with, run_code.
If you want to send data between programming languages, save the data to a txt or json file.
You can install new packages with pip for python and npm for javascript. Try to install all necessary packages in one command at the beginning.
When a user refers to a filename, they're likely referring to an existing file in the directory you're currently in (run_code executes on the user's machine).
In general, choose packages that have the most universal chance to be already installed and to work across multiple applications.
Write messages to the user in Markdown.
In general, try to make plans with as few steps as possible.";

const FREE_TEXT_SCOPE_LINE: &str =
    "Only do what the user asks you to do, then ask what they'd like to do next.";
const FENCED_CODE_INSTRUCTIONS: &str = "To run code, write a fenced code block (i.e ```python or ```shell) in markdown. When you close it with ```, it will be run. You'll then be given its output.";

const INSTRUCTION_OPENER: &str = "<s>[INST] ";

const OPENING_NUDGE: &str = "Let's explore this. By the way, I can run code on your machine by writing the code in a markdown code block. This works for shell, javascript, python, and applescript. I'm going to try to do this for your task. Anyway,";
const OUTPUT_NUDGE: &str = "Given the output of the code I just ran, ";
const NO_OUTPUT_NUDGE: &str = "Given the fact that the code I just ran produced no output, ";

/// Builds the system message for one request.
///
/// Free-text models get a condensed base (the lines that do not mention
/// `run_code`) and instructions for fenced code blocks.
pub fn system_message(base: &str, mode: ResponseMode) -> String {
    let mut message = match mode {
        ResponseMode::Structured => base.trim().to_string(),
        ResponseMode::FreeText => {
            let mut condensed = base.trim().lines().take(3).collect::<Vec<_>>().join("\n");
            condensed.push('\n');
            condensed.push_str(FREE_TEXT_SCOPE_LINE);
            condensed
        }
    };

    message.push_str("\n\n");
    message.push_str(&user_info());
    if mode == ResponseMode::FreeText {
        message.push_str("\n\n");
        message.push_str(FENCED_CODE_INSTRUCTIONS);
    }
    message
}

fn user_info() -> String {
    let name = env_nonempty("USER")
        .or_else(|| env_nonempty("USERNAME"))
        .unwrap_or_else(|| "unknown".to_string());
    let cwd = std::env::current_dir()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!(
        "[User Info]\nName: {name}\nCWD: {cwd}\nOS: {}",
        std::env::consts::OS
    )
}

/// Renders the history in the `[INST]` instruction format.
pub fn messages_to_prompt(system: &str, messages: &[Message]) -> String {
    let mut prompt = format!("<s>[INST] <<SYS>>\n{system}\n<</SYS>>\n");

    for message in messages {
        match message {
            Message::User { content } => {
                prompt.push_str(content);
                prompt.push_str(" [/INST] ");
            }
            Message::Function { content, .. } => {
                prompt.push_str("Output: ");
                prompt.push_str(content);
                prompt.push_str(" [/INST] ");
            }
            Message::Assistant(assistant) => {
                prompt.push_str(assistant.content.as_deref().unwrap_or_default());
                prompt.push_str(" </s><s>[INST] ");
            }
        }
    }

    if prompt.ends_with(INSTRUCTION_OPENER) {
        prompt.truncate(prompt.len() - INSTRUCTION_OPENER.len());
    }
    prompt
}

/// Phrase appended after the rendered history to steer the next completion.
pub fn continuation_nudge(last: Option<&Message>) -> &'static str {
    match last {
        Some(Message::Function { content, .. }) if content == NO_OUTPUT => NO_OUTPUT_NUDGE,
        Some(Message::Function { .. }) => OUTPUT_NUDGE,
        _ => OPENING_NUDGE,
    }
}

pub fn build_prompt(system: &str, messages: &[Message]) -> String {
    let mut prompt = messages_to_prompt(system, messages);
    prompt.push_str(continuation_nudge(messages.last()));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::message::AssistantMessage;

    fn assistant(text: &str) -> Message {
        Message::Assistant(AssistantMessage {
            content: Some(text.to_string()),
            ..AssistantMessage::default()
        })
    }

    #[test]
    fn test_messages_to_prompt_wraps_each_role() {
        let messages = vec![
            Message::user("list files"),
            assistant("```shell\nls\n```"),
            Message::function_result("a.txt"),
        ];
        assert_eq!(
            messages_to_prompt("SYS", &messages),
            "<s>[INST] <<SYS>>\nSYS\n<</SYS>>\nlist files [/INST] ```shell\nls\n``` </s><s>[INST] Output: a.txt [/INST] "
        );
    }

    #[test]
    fn test_trailing_instruction_opener_is_removed() {
        let messages = vec![Message::user("hi"), assistant("Hello")];
        assert!(messages_to_prompt("SYS", &messages).ends_with("Hello </s>"));
    }

    #[test]
    fn test_nudge_depends_on_last_message() {
        assert_eq!(continuation_nudge(None), OPENING_NUDGE);
        assert_eq!(
            continuation_nudge(Some(&Message::user("hi"))),
            OPENING_NUDGE
        );
        assert_eq!(
            continuation_nudge(Some(&Message::function_result("42"))),
            OUTPUT_NUDGE
        );
        assert_eq!(
            continuation_nudge(Some(&Message::function_result(NO_OUTPUT))),
            NO_OUTPUT_NUDGE
        );
    }

    #[test]
    fn test_build_prompt_ends_with_nudge() {
        let prompt = build_prompt("SYS", &[Message::user("plot a sine wave")]);
        assert!(prompt.starts_with("<s>[INST] <<SYS>>\nSYS\n<</SYS>>\nplot a sine wave [/INST] "));
        assert!(prompt.ends_with("Anyway,"));
    }

    #[test]
    fn test_free_text_system_message_is_condensed() {
        let message = system_message(DEFAULT_SYSTEM_MESSAGE, ResponseMode::FreeText);
        let head: Vec<&str> = message.lines().take(4).collect();
        assert_eq!(head[3], FREE_TEXT_SCOPE_LINE);
        assert!(!head.join("\n").contains("run_code"));
        assert!(message.contains("[User Info]\nName: "));
        assert!(message.ends_with(FENCED_CODE_INSTRUCTIONS));

        let structured = system_message(DEFAULT_SYSTEM_MESSAGE, ResponseMode::Structured);
        assert!(structured.contains("run_code"));
        assert!(!structured.contains(FENCED_CODE_INSTRUCTIONS));
        assert!(structured.contains(&format!("OS: {}", std::env::consts::OS)));
    }
}

use crate::config::{BackendKind, Config};
use crate::state::{BlockKind, ConversationStreamUpdate, TurnOutcome, TurnSummary};
use anyhow::Result;
use crossterm::style::{Color, Stylize};
use std::io::{self, IsTerminal, Write};
use unicode_width::UnicodeWidthStr;

const RULE_WIDTH: usize = 60;
const CODE_GUTTER: &str = "  │ ";

#[derive(Debug, Default)]
struct CodeView {
    header_printed: bool,
    language: Option<String>,
    code: String,
    printed_lines: usize,
    output_started: bool,
    /// Re-opened block showing an already rendered draft; only output is shown.
    replay: bool,
}

/// Renders conversation updates as plain terminal lines.
///
/// Code arrives as whole snapshots, so only lines that can no longer change
/// (everything before the last newline) are printed while streaming; the
/// tail is flushed when the block ends.
pub struct StreamPrinter<W: Write = io::Stdout> {
    out: W,
    colors_enabled: bool,
    at_line_start: bool,
    code: Option<CodeView>,
    last_code: Option<(Option<String>, String)>,
}

impl StreamPrinter<io::Stdout> {
    pub fn new() -> Self {
        let colors_enabled =
            io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
        Self::with_writer(io::stdout(), colors_enabled)
    }
}

impl Default for StreamPrinter<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> StreamPrinter<W> {
    pub fn with_writer(out: W, colors_enabled: bool) -> Self {
        Self {
            out,
            colors_enabled,
            at_line_start: true,
            code: None,
            last_code: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn on_update(&mut self, update: ConversationStreamUpdate) -> Result<()> {
        match update {
            ConversationStreamUpdate::Separator => self.write_raw("\n")?,
            ConversationStreamUpdate::BlockStart(BlockKind::Prose) => self.ensure_newline()?,
            ConversationStreamUpdate::BlockStart(BlockKind::Code) => {
                self.ensure_newline()?;
                self.code = Some(CodeView::default());
            }
            ConversationStreamUpdate::ProseDelta(text) => self.write_raw(&text)?,
            ConversationStreamUpdate::CodeSnapshot { language, code } => {
                self.on_code_snapshot(language, code)?
            }
            ConversationStreamUpdate::CodeOutput(line) => self.on_code_output(&line)?,
            ConversationStreamUpdate::BlockEnd(BlockKind::Prose) => self.ensure_newline()?,
            ConversationStreamUpdate::BlockEnd(BlockKind::Code) => self.on_code_end()?,
            // Approval requests are answered by the app before they get here.
            ConversationStreamUpdate::ToolApprovalRequest(_) => {}
        }
        self.out.flush()?;
        Ok(())
    }

    fn on_code_snapshot(&mut self, language: Option<String>, code: String) -> Result<()> {
        let Some(mut view) = self.code.take() else {
            return Ok(());
        };
        if !view.header_printed && self.last_code.as_ref() == Some(&(language.clone(), code.clone()))
        {
            view.replay = true;
        }
        view.language = language;
        view.code = code;

        if !view.header_printed && (view.language.is_some() || !view.code.is_empty()) {
            let label = if view.replay {
                format!("running {}", view.language.as_deref().unwrap_or("code"))
            } else {
                view.language.clone().unwrap_or_else(|| "code".to_string())
            };
            self.write_rule("┌─", &label)?;
            view.header_printed = true;
        }
        if !view.replay {
            self.print_settled_lines(&mut view, false)?;
        }
        self.code = Some(view);
        Ok(())
    }

    fn on_code_output(&mut self, line: &str) -> Result<()> {
        let Some(mut view) = self.code.take() else {
            let text = format!("{line}\n");
            return self.write_raw(&text);
        };
        if !view.output_started {
            if !view.replay {
                self.print_settled_lines(&mut view, true)?;
                self.write_rule("├─", "output")?;
            }
            view.output_started = true;
        }
        let painted = self.paint(line, Color::DarkGrey);
        self.write_line(&format!("{CODE_GUTTER}{painted}"))?;
        self.code = Some(view);
        Ok(())
    }

    fn on_code_end(&mut self) -> Result<()> {
        let Some(mut view) = self.code.take() else {
            return Ok(());
        };
        if !view.replay {
            self.print_settled_lines(&mut view, true)?;
        }
        if view.header_printed {
            self.write_rule("└─", "")?;
        }
        self.last_code = Some((view.language, view.code));
        Ok(())
    }

    fn print_settled_lines(&mut self, view: &mut CodeView, include_tail: bool) -> Result<()> {
        let lines: Vec<&str> = view.code.split('\n').collect();
        let settled = if include_tail {
            lines.len()
        } else {
            lines.len().saturating_sub(1)
        };
        for (index, line) in lines.iter().enumerate().take(settled).skip(view.printed_lines) {
            // trailing newline
            if include_tail && line.is_empty() && index + 1 == lines.len() {
                break;
            }
            let painted = self.paint(line, Color::Cyan);
            self.write_line(&format!("{CODE_GUTTER}{painted}"))?;
        }
        view.printed_lines = view.printed_lines.max(settled);
        Ok(())
    }

    pub fn print_welcome(&mut self, config: &Config) -> Result<()> {
        let backend = match config.backend {
            BackendKind::Chat => "chat",
            BackendKind::Completion => "text completion",
        };
        let model = self.paint(&config.model, Color::Green);
        self.write_line(&format!("▌ Model set to {model} ({backend} backend)"))?;
        if !config.auto_run {
            self.write_line("")?;
            self.write_line(
                "Tip: code runs only after you approve it. Start with `codeloop -y` to skip approval.",
            )?;
        }
        let commands = self.paint(
            "Commands: %debug, %reset, %save <path>, %load <path>, exit",
            Color::DarkGrey,
        );
        self.write_line(&commands)?;
        self.write_line("")?;
        self.out.flush()?;
        Ok(())
    }

    pub fn print_prompt(&mut self) -> Result<()> {
        self.ensure_newline()?;
        let prompt = self.paint("> ", Color::Green);
        self.write_raw(&prompt)?;
        self.at_line_start = true;
        self.out.flush()?;
        Ok(())
    }

    pub fn print_approval_prompt(&mut self) -> Result<()> {
        self.ensure_newline()?;
        self.write_raw("  Would you like to run this code? (y/n)\n\n  ")?;
        self.at_line_start = true;
        self.out.flush()?;
        Ok(())
    }

    pub fn print_turn_summary(&mut self, summary: &TurnSummary) -> Result<()> {
        let notice = match summary.outcome {
            TurnOutcome::Finished | TurnOutcome::Declined => None,
            TurnOutcome::Interrupted => Some("[interrupted]".to_string()),
            TurnOutcome::RoundLimit => Some(format!(
                "[stopped after {} code runs; raise --max-tool-rounds to let it continue]",
                summary.tool_rounds
            )),
        };
        if let Some(notice) = notice {
            self.print_notice(&notice)?;
        }
        Ok(())
    }

    pub fn print_notice(&mut self, message: &str) -> Result<()> {
        self.ensure_newline()?;
        let painted = self.paint(message, Color::DarkGrey);
        self.write_line(&painted)?;
        self.out.flush()?;
        Ok(())
    }

    pub fn print_error(&mut self, message: &str) -> Result<()> {
        self.ensure_newline()?;
        let painted = self.paint(&format!("[error] {message}"), Color::Red);
        self.write_line(&painted)?;
        self.out.flush()?;
        Ok(())
    }

    /// Abandons any half-rendered code block, e.g. after a failed turn.
    pub fn end_turn(&mut self) -> Result<()> {
        if self.code.is_some() {
            self.on_code_end()?;
        }
        self.ensure_newline()?;
        self.out.flush()?;
        Ok(())
    }

    fn write_rule(&mut self, corner: &str, label: &str) -> Result<()> {
        let corner_width = UnicodeWidthStr::width(corner);
        let rule = if label.is_empty() {
            let fill = "─".repeat(RULE_WIDTH.saturating_sub(corner_width));
            format!("  {corner}{fill}")
        } else {
            let used = corner_width + UnicodeWidthStr::width(label) + 2;
            let fill = "─".repeat(RULE_WIDTH.saturating_sub(used));
            format!("  {corner} {label} {fill}")
        };
        let painted = self.paint(&rule, Color::DarkGrey);
        self.write_line(&painted)
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.colors_enabled {
            text.with(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        self.ensure_newline()?;
        self.write_raw(line)?;
        self.write_raw("\n")
    }

    fn write_raw(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.out.write_all(text.as_bytes())?;
        self.at_line_start = text.ends_with('\n');
        Ok(())
    }

    fn ensure_newline(&mut self) -> Result<()> {
        if !self.at_line_start {
            self.write_raw("\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(updates: Vec<ConversationStreamUpdate>) -> String {
        let mut printer = StreamPrinter::with_writer(Vec::new(), false);
        for update in updates {
            printer.on_update(update).unwrap();
        }
        String::from_utf8(printer.into_inner()).unwrap()
    }

    fn snapshot(language: &str, code: &str) -> ConversationStreamUpdate {
        ConversationStreamUpdate::CodeSnapshot {
            language: Some(language.to_string()),
            code: code.to_string(),
        }
    }

    #[test]
    fn test_prose_streams_inline() {
        let text = render(vec![
            ConversationStreamUpdate::BlockStart(BlockKind::Prose),
            ConversationStreamUpdate::ProseDelta("Hello".to_string()),
            ConversationStreamUpdate::ProseDelta(" world".to_string()),
            ConversationStreamUpdate::BlockEnd(BlockKind::Prose),
        ]);
        assert_eq!(text, "Hello world\n");
    }

    #[test]
    fn test_code_lines_print_once_settled() {
        let text = render(vec![
            ConversationStreamUpdate::BlockStart(BlockKind::Code),
            snapshot("python", "print(1"),
            snapshot("python", "print(1)\nprint(2"),
            snapshot("python", "print(1)\nprint(2)"),
            ConversationStreamUpdate::CodeOutput("1".to_string()),
            ConversationStreamUpdate::CodeOutput("2".to_string()),
            ConversationStreamUpdate::BlockEnd(BlockKind::Code),
        ]);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("  ┌─ python ─"));
        assert_eq!(lines[1], "  │ print(1)");
        assert_eq!(lines[2], "  │ print(2)");
        assert!(lines[3].starts_with("  ├─ output ─"));
        assert_eq!(&lines[4..6], ["  │ 1", "  │ 2"]);
        assert!(lines[6].starts_with("  └─"));
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn test_reopened_block_only_shows_output() {
        let text = render(vec![
            ConversationStreamUpdate::BlockStart(BlockKind::Code),
            snapshot("shell", "ls"),
            ConversationStreamUpdate::BlockEnd(BlockKind::Code),
            ConversationStreamUpdate::BlockStart(BlockKind::Code),
            snapshot("shell", "ls"),
            ConversationStreamUpdate::CodeOutput("a.txt".to_string()),
            ConversationStreamUpdate::BlockEnd(BlockKind::Code),
        ]);
        assert_eq!(text.matches("│ ls").count(), 1);
        assert!(text.contains("┌─ running shell"));
        assert!(text.contains("  │ a.txt\n"));
    }

    #[test]
    fn test_rule_width_accounts_for_wide_labels() {
        let mut printer = StreamPrinter::with_writer(Vec::new(), false);
        printer.write_rule("┌─", "日本").unwrap();
        let text = String::from_utf8(printer.into_inner()).unwrap();
        let width = UnicodeWidthStr::width(text.trim_end_matches('\n'));
        assert_eq!(width, RULE_WIDTH + 2);
    }
}

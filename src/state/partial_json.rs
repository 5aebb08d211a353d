use super::message::CodeArguments;

/// Best-effort parser for the streamed `run_code` argument payload.
///
/// Every observation retries a full parse of the accumulated text. When that
/// fails the text is closed off (open string, open containers) and parsed
/// again so the code can be shown while it streams. Failures are swallowed;
/// the last successful value is kept.
#[derive(Debug, Default)]
pub struct ArgumentExtractor {
    observed_len: usize,
    last: Option<CodeArguments>,
}

impl ArgumentExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, accumulated: &str) -> Option<&CodeArguments> {
        if accumulated.len() != self.observed_len {
            self.observed_len = accumulated.len();
            if let Some(parsed) = parse_arguments(accumulated) {
                self.last = Some(parsed);
            }
        }
        self.last.as_ref()
    }

    pub fn last(&self) -> Option<&CodeArguments> {
        self.last.as_ref()
    }
}

fn parse_arguments(text: &str) -> Option<CodeArguments> {
    if text.trim().is_empty() {
        return None;
    }
    serde_json::from_str::<CodeArguments>(text)
        .ok()
        .or_else(|| serde_json::from_str::<CodeArguments>(&close_partial_json(text)).ok())
}

/// Appends whatever closing characters an unfinished JSON document needs,
/// dropping a dangling comma first.
pub fn close_partial_json(text: &str) -> String {
    let mut closers = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
            }
            _ => {}
        }
    }

    let mut closed = text.to_string();
    if in_string {
        if escaped {
            closed.pop();
        }
        closed.push('"');
    } else if let Some(kept) = closed.trim_end().strip_suffix(',').map(str::len) {
        closed.truncate(kept);
    }
    while let Some(closer) = closers.pop() {
        closed.push(closer);
    }
    closed
}

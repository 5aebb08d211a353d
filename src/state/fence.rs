//! Code-region detection for backends that can only emit prose.
//!
//! The model is asked to write markdown fenced code blocks; a block counts as
//! a code unit while an odd number of fence markers has been seen, and is
//! complete the moment the count turns even again. Stray markers inside prose
//! will flip the region; that is not detected.

use super::message::CodeArguments;

pub const FENCE_MARKER: &str = "```";

pub fn fence_count(content: &str) -> usize {
    content.matches(FENCE_MARKER).count()
}

pub fn inside_code_region(content: &str) -> bool {
    fence_count(content) % 2 == 1
}

/// Result of scanning the accumulated content once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceScan {
    pub inside: bool,
    pub arguments: Option<CodeArguments>,
}

#[derive(Debug, Clone)]
pub struct FenceDetector {
    fallback_language: String,
}

impl FenceDetector {
    pub fn new(fallback_language: impl Into<String>) -> Self {
        Self {
            fallback_language: fallback_language.into(),
        }
    }

    pub fn scan(&self, content: Option<&str>) -> FenceScan {
        let Some(content) = content else {
            return FenceScan {
                inside: false,
                arguments: None,
            };
        };

        if !inside_code_region(content) {
            return FenceScan {
                inside: false,
                arguments: None,
            };
        }

        FenceScan {
            inside: true,
            arguments: self.parse_open_block(content),
        }
    }

    /// Extracts language and code from the last, still open, fenced segment.
    pub fn parse_open_block(&self, content: &str) -> Option<CodeArguments> {
        if !content.contains(FENCE_MARKER) {
            return None;
        }
        let segment = content.rsplit(FENCE_MARKER).next()?;

        let mut lines = segment.split('\n');
        let language_line = lines.next().unwrap_or_default().trim();
        let language = if content.trim() == FENCE_MARKER {
            None
        } else if language_line.is_empty() {
            Some(self.fallback_language.clone())
        } else {
            Some(language_line.to_string())
        };

        let code = lines
            .collect::<Vec<_>>()
            .join("\n")
            .trim_matches(|c| c == '`' || c == ' ' || c == '\n')
            .to_string();

        Some(CodeArguments {
            language,
            code: Some(code),
        })
    }

    /// Re-parses the block a closing marker just completed, so fragments that
    /// arrived together with the closing marker are not lost.
    pub fn parse_closed_block(&self, content: &str) -> Option<CodeArguments> {
        let (open, _) = content.rsplit_once(FENCE_MARKER)?;
        self.parse_open_block(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> FenceDetector {
        FenceDetector::new("python")
    }

    #[test]
    fn test_parity_holds_for_every_prefix() {
        let content = "Sure.\n```python\nprint(1)\n```\nThen ```sh\nls\n``` done";
        let marker_ends: Vec<usize> = content
            .match_indices(FENCE_MARKER)
            .map(|(start, marker)| start + marker.len())
            .collect();
        assert_eq!(marker_ends.len(), 4);

        for index in 0..=content.len() {
            let prefix = &content[..index];
            let seen = marker_ends.iter().filter(|end| **end <= index).count();
            assert_eq!(inside_code_region(prefix), seen % 2 == 1, "prefix {prefix:?}");
        }
    }

    #[test]
    fn test_open_block_yields_language_and_code() {
        let scan = detector().scan(Some("Let's run ```python\nprint(1)\n"));
        assert!(scan.inside);
        assert_eq!(
            scan.arguments,
            Some(CodeArguments::new("python", "print(1)"))
        );
    }

    #[test]
    fn test_partial_closing_marker_is_trimmed_from_code() {
        let scan = detector().scan(Some("```shell\necho hi\n``"));
        assert!(scan.inside);
        assert_eq!(scan.arguments, Some(CodeArguments::new("shell", "echo hi")));
    }

    #[test]
    fn test_language_omitted_until_present() {
        let scan = detector().scan(Some("```"));
        assert!(scan.inside);
        let arguments = scan.arguments.unwrap();
        assert_eq!(arguments.language, None);
        assert_eq!(arguments.code.as_deref(), Some(""));
    }

    #[test]
    fn test_empty_language_line_uses_fallback() {
        let scan = detector().scan(Some("Here:\n```\nx = 1\n"));
        assert_eq!(scan.arguments, Some(CodeArguments::new("python", "x = 1")));
    }

    #[test]
    fn test_closing_fragment_is_folded_into_closed_block() {
        let content = "Let's run ```python\nprint(1)\n```";
        assert_eq!(
            detector().parse_closed_block(content),
            Some(CodeArguments::new("python", "print(1)"))
        );
        assert_eq!(detector().parse_closed_block("no fences"), None);
    }

    #[test]
    fn test_closed_block_is_outside() {
        let scan = detector().scan(Some("```python\nprint(1)\n```"));
        assert!(!scan.inside);
        assert_eq!(scan.arguments, None);
        assert!(!detector().scan(None).inside);
    }
}

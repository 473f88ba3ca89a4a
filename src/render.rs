//! Message text to display blocks.
//!
//! Sections are split on blank lines, fenced code is found by a small
//! tokenizer, and the remaining lines become headings or paragraphs with
//! bold/italic/inline-code spans. Nothing here fails: input that does not
//! parse is shown as literal text.

use std::sync::OnceLock;

use regex::Regex;

pub const DEFAULT_LANGUAGE: &str = "plaintext";

const FENCE: &[u8] = b"```";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Bold(String),
    Italic(String),
    Code(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayBlock {
    Heading { level: u8, text: String },
    Paragraph { spans: Vec<Inline> },
    CodeBlock { language: String, code: String },
}

pub fn render_message(content: &str) -> Vec<DisplayBlock> {
    if content.is_empty() {
        return Vec::new();
    }
    content.split("\n\n").flat_map(render_section).collect()
}

/// Literal text of the `n`-th code block (0-based) in `content`.
pub fn nth_code_block(content: &str, n: usize) -> Option<String> {
    render_message(content)
        .into_iter()
        .filter_map(|block| match block {
            DisplayBlock::CodeBlock { code, .. } => Some(code),
            _ => None,
        })
        .nth(n)
}

fn render_section(section: &str) -> Vec<DisplayBlock> {
    let mut blocks = Vec::new();
    for segment in scan_fences(section) {
        match segment {
            Segment::Text(text) => blocks.extend(text.split('\n').map(render_line)),
            Segment::Code { language, code } => {
                let language = if language.is_empty() { DEFAULT_LANGUAGE } else { language };
                blocks.push(DisplayBlock::CodeBlock {
                    language: language.to_string(),
                    code: code.trim().to_string(),
                });
            }
        }
    }
    blocks
}

// ---------- Fence tokenizer ----------

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Code { language: &'a str, code: &'a str },
}

#[derive(Copy, Clone, Debug)]
enum ScanState<'a> {
    Text,
    FenceHeader { open: usize },
    FenceBody { open: usize, language: &'a str, body: usize },
}

/// Single pass over `section`. All slice points sit next to ASCII bytes
/// (backticks, newlines), so they are always char boundaries.
fn scan_fences(section: &str) -> Vec<Segment<'_>> {
    let bytes = section.as_bytes();
    let mut segments = Vec::new();
    let mut state = ScanState::Text;
    let mut text_start = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        match state {
            ScanState::Text => {
                if bytes[pos..].starts_with(FENCE) {
                    state = ScanState::FenceHeader { open: pos };
                    pos += FENCE.len();
                } else {
                    pos += 1;
                }
            }
            ScanState::FenceHeader { open } => {
                let b = bytes[pos];
                if b == b'\n' {
                    let language = &section[open + FENCE.len()..pos];
                    state = ScanState::FenceBody { open, language, body: pos + 1 };
                    pos += 1;
                } else if b.is_ascii_alphanumeric() || b == b'_' {
                    pos += 1;
                } else {
                    // not an opener; the first backtick is plain text
                    state = ScanState::Text;
                    pos = open + 1;
                }
            }
            ScanState::FenceBody { open, language, body } => {
                if bytes[pos..].starts_with(FENCE) {
                    if text_start < open {
                        segments.push(Segment::Text(&section[text_start..open]));
                    }
                    segments.push(Segment::Code { language, code: &section[body..pos] });
                    pos += FENCE.len();
                    text_start = pos;
                    state = ScanState::Text;
                } else {
                    pos += 1;
                }
            }
        }
    }

    // An unclosed fence never produced a segment, so it stays in the tail text.
    if text_start < bytes.len() {
        segments.push(Segment::Text(&section[text_start..]));
    }
    segments
}

// ---------- Lines + inline spans ----------

fn render_line(line: &str) -> DisplayBlock {
    for (level, prefix) in [(1u8, "# "), (2, "## "), (3, "### ")] {
        if let Some(text) = line.strip_prefix(prefix) {
            return DisplayBlock::Heading { level, text: text.to_string() };
        }
    }
    DisplayBlock::Paragraph { spans: parse_inline(line) }
}

fn inline_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\*\*(.*?)\*\*|\*(.*?)\*|`([^`]+)`").expect("inline markup pattern compiles")
    })
}

/// Leftmost match wins; at one position bold beats italic beats code.
fn parse_inline(line: &str) -> Vec<Inline> {
    let mut spans = Vec::new();
    let mut last = 0;
    for caps in inline_pattern().captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        if last < whole.start() {
            spans.push(Inline::Text(line[last..whole.start()].to_string()));
        }
        let span = if let Some(m) = caps.get(1) {
            Inline::Bold(m.as_str().to_string())
        } else if let Some(m) = caps.get(2) {
            Inline::Italic(m.as_str().to_string())
        } else if let Some(m) = caps.get(3) {
            Inline::Code(m.as_str().to_string())
        } else {
            Inline::Text(whole.as_str().to_string())
        };
        spans.push(span);
        last = whole.end();
    }
    if last < line.len() {
        spans.push(Inline::Text(line[last..].to_string()));
    }
    spans
}

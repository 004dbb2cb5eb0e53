//! # Output formatting
//!
//! Renders collected messages in the user's chosen format: plain text, JSON,
//! or ANSI-styled markdown. The markdown path is a thin wrapper around
//! `pulldown_cmark` that converts events into escape-coded lines, with
//! syntect highlighting for fenced code blocks.

use std::sync::LazyLock;

use clap::ValueEnum;
use pulldown_cmark::{CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::{LinesWithEndings, as_24_bit_terminal_escaped};

use crate::providers::{Message, ResponseMetrics};

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

/// How responses are printed to the terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

impl OutputFormat {
    /// Case-insensitive parse, for config values and environment variables.
    pub fn parse(s: &str) -> Option<OutputFormat> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            "markdown" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }
}

/// Format collected messages for display.
pub fn format_messages(messages: &[Message], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(messages).unwrap_or_else(|e| format!("[serialization error: {e}]"))
        }
        OutputFormat::Text => messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Markdown => {
            let combined = messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            render_markdown(&combined)
        }
    }
}

/// Format response metrics for display (`--show-metrics`).
pub fn format_metrics(metrics: &ResponseMetrics) -> String {
    format!(
        "duration: {:.2}s\nprovider: {}\nmodel:    {}",
        metrics.duration.as_secs_f64(),
        metrics.provider,
        metrics.model,
    )
}

// ── ANSI styles ─────────────────────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const ITALIC: &str = "\x1b[3m";
const UNDERLINE: &str = "\x1b[4m";
const STRIKE: &str = "\x1b[9m";
const CYAN: &str = "\x1b[36m";
const GRAY: &str = "\x1b[90m";
const INLINE_CODE: &str = "\x1b[37;48;5;238m";

/// Parse markdown content into an ANSI-styled string.
pub fn render_markdown(content: &str) -> String {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TASKLISTS);

    let events: Vec<Event<'_>> = Parser::new_ext(content, opts).collect();
    let mut w = Writer::new();
    for event in events {
        w.handle(event);
    }
    w.finish()
}

// ── Writer ──────────────────────────────────────────────────────────────────

struct Writer {
    out: String,
    /// Current (uncommitted) line.
    line: String,
    /// Inline style stack (bold, italic, heading text, etc.). Styles compose
    /// by concatenating escape codes, so nested bold+italic works.
    styles: Vec<String>,
    /// Per-line prefix strings (blockquote/code `│`).
    line_prefixes: Vec<String>,
    /// List nesting: None = unordered, Some(n) = ordered at index n.
    list_indices: Vec<Option<u64>>,
    /// Active syntax highlighter for fenced code blocks.
    highlighter: Option<HighlightLines<'static>>,
    /// True when inside a fenced code block without syntax highlighting.
    in_plain_code: bool,
    /// Stored link URL, appended after the link text closes.
    link_url: Option<String>,
    /// Whether the next block element should be preceded by a blank line.
    needs_newline: bool,
}

impl Writer {
    fn new() -> Self {
        Self {
            out: String::new(),
            line: String::new(),
            styles: vec![],
            line_prefixes: vec![],
            list_indices: vec![],
            highlighter: None,
            in_plain_code: false,
            link_url: None,
            needs_newline: false,
        }
    }

    fn finish(mut self) -> String {
        if !self.line.is_empty() {
            self.commit_line();
        }
        self.out
    }

    // ── Style helpers ───────────────────────────────────────────────────

    /// Current effective style: concatenation of the whole stack.
    fn style(&self) -> String {
        self.styles.concat()
    }

    fn push_style(&mut self, overlay: &str) {
        self.styles.push(overlay.to_string());
    }

    fn pop_style(&mut self) {
        self.styles.pop();
    }

    // ── Line/span helpers ───────────────────────────────────────────────

    /// Commit the current line (with prefixes) to the output.
    fn commit_line(&mut self) {
        for prefix in &self.line_prefixes {
            self.out.push_str(prefix);
        }
        self.out.push_str(&self.line);
        self.out.push('\n');
        self.line.clear();
    }

    /// Append a styled fragment to the current line.
    fn push_span(&mut self, text: &str, style: &str) {
        if style.is_empty() {
            self.line.push_str(text);
        } else {
            self.line.push_str(style);
            self.line.push_str(text);
            self.line.push_str(RESET);
        }
    }

    fn blank_line_if_needed(&mut self) {
        if self.needs_newline {
            self.commit_line();
            self.needs_newline = false;
        }
    }

    // ── Event dispatch ──────────────────────────────────────────────────

    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.open(tag),
            Event::End(tag) => self.close(tag),
            Event::Text(t) => self.text(t),
            Event::Code(c) => self.inline_code(c),
            Event::SoftBreak => self.push_span(" ", ""),
            Event::HardBreak => self.commit_line(),
            Event::Rule => {
                self.blank_line_if_needed();
                self.push_span(&"─".repeat(40), GRAY);
                self.commit_line();
                self.needs_newline = true;
            }
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                self.push_span(marker, "");
            }
            _ => {} // HTML, footnotes, math — skip
        }
    }

    fn open(&mut self, tag: Tag<'_>) {
        match tag {
            // ── Block elements ──────────────────────────────────────────
            Tag::Paragraph => {
                self.blank_line_if_needed();
            }
            Tag::Heading { level, .. } => {
                self.blank_line_if_needed();
                let hs = heading_style(level);
                let depth = heading_depth(level) as usize;
                self.push_span(&format!("{} ", "#".repeat(depth)), hs);
                self.push_style(hs);
            }
            Tag::BlockQuote(_) => {
                self.blank_line_if_needed();
                self.line_prefixes.push(format!("{GRAY}│ {RESET}"));
                self.push_style(DIM);
                self.push_style(ITALIC);
            }
            Tag::CodeBlock(kind) => {
                if !self.line.is_empty() {
                    self.commit_line();
                }
                self.blank_line_if_needed();
                let lang = match &kind {
                    CodeBlockKind::Fenced(l) => l.as_ref(),
                    CodeBlockKind::Indented => "",
                };

                // Top border: ╭── lang ──  or just ╭──
                if lang.is_empty() {
                    self.push_span("╭──", GRAY);
                } else {
                    self.push_span("╭── ", GRAY);
                    self.push_span(lang, BOLD);
                    self.push_span(" ──", GRAY);
                }
                self.commit_line();

                // Left border prefix for code content
                self.line_prefixes.push(format!("{GRAY}│ {RESET}"));

                // Syntax highlighting setup
                if !lang.is_empty()
                    && let Some(syn) = SYNTAX_SET.find_syntax_by_token(lang)
                {
                    let theme = &THEME_SET.themes["base16-ocean.dark"];
                    self.highlighter = Some(HighlightLines::new(syn, theme));
                }
                if self.highlighter.is_none() {
                    self.in_plain_code = true;
                }
            }
            Tag::List(start) => {
                if self.list_indices.is_empty() {
                    self.blank_line_if_needed();
                }
                self.list_indices.push(start);
            }
            Tag::Item => {
                if !self.line.is_empty() {
                    self.commit_line();
                }
                let depth = self.list_indices.len().saturating_sub(1);
                let indent = "  ".repeat(depth);
                if let Some(idx) = self.list_indices.last_mut() {
                    let marker = match idx {
                        None => format!("{indent}- "),
                        Some(n) => {
                            let s = format!("{indent}{}. ", n);
                            *n += 1;
                            s
                        }
                    };
                    self.push_span(&marker, GRAY);
                }
            }

            // ── Inline elements ─────────────────────────────────────────
            Tag::Emphasis => self.push_style(ITALIC),
            Tag::Strong => self.push_style(BOLD),
            Tag::Strikethrough => self.push_style(STRIKE),
            Tag::Link { dest_url, .. } => {
                self.link_url = Some(dest_url.to_string());
                self.push_style(CYAN);
                self.push_style(UNDERLINE);
            }
            _ => {} // Tables, images, definitions — skip
        }
    }

    fn close(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.commit_line();
                self.needs_newline = true;
            }
            TagEnd::Heading(_) => {
                self.pop_style();
                self.commit_line();
                self.needs_newline = true;
            }
            TagEnd::BlockQuote(_) => {
                self.line_prefixes.pop();
                self.pop_style();
                self.pop_style();
                self.needs_newline = true;
            }
            TagEnd::CodeBlock => {
                self.highlighter = None;
                self.in_plain_code = false;
                self.line_prefixes.pop(); // remove │ prefix before bottom border
                self.push_span("╰──", GRAY);
                self.commit_line();
                self.needs_newline = true;
            }
            TagEnd::List(_) => {
                self.list_indices.pop();
                if !self.line.is_empty() {
                    self.commit_line();
                }
                self.needs_newline = true;
            }
            TagEnd::Item => {
                if !self.line.is_empty() {
                    self.commit_line();
                }
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::Link => {
                self.pop_style();
                self.pop_style();
                if let Some(url) = self.link_url.take() {
                    self.push_span(" (", "");
                    self.push_span(&url, CYAN);
                    self.push_span(")", "");
                }
            }
            _ => {}
        }
    }

    // ── Content handlers ────────────────────────────────────────────────

    fn text(&mut self, cow: CowStr<'_>) {
        // Expand tabs → 4 spaces for stable column widths
        let raw = cow.to_string();
        let text = if raw.contains('\t') {
            raw.replace('\t', "    ")
        } else {
            raw
        };

        // Syntax-highlighted code block — take highlighter out to avoid
        // double-mutable-borrow (highlight_line borrows it, commit_line borrows self)
        if self.highlighter.is_some() {
            let mut hl = self.highlighter.take().unwrap();
            for line in LinesWithEndings::from(text.as_str()) {
                if let Ok(ranges) = hl.highlight_line(line, &SYNTAX_SET) {
                    let escaped = as_24_bit_terminal_escaped(&ranges, false);
                    self.line.push_str(escaped.trim_end_matches('\n'));
                    self.line.push_str(RESET);
                    self.commit_line();
                }
            }
            self.highlighter = Some(hl);
            return;
        }

        // Plain code block (no highlighting available)
        if self.in_plain_code {
            for line in text.lines() {
                self.line.push_str(line);
                self.commit_line();
            }
            return;
        }

        // Normal text — inherits current style (heading, bold, etc.)
        let style = self.style();
        self.push_span(&text, &style);
    }

    fn inline_code(&mut self, cow: CowStr<'_>) {
        self.push_span(&cow, INLINE_CODE);
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn heading_style(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "\x1b[1;4m",
        HeadingLevel::H2 => BOLD,
        _ => "\x1b[1;3m",
    }
}

fn heading_depth(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Message;

    /// Strip ANSI escape sequences so tests can assert on visible text.
    fn strip_ansi(s: &str) -> String {
        let mut out = String::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '\x1b' {
                for c in chars.by_ref() {
                    if c == 'm' {
                        break;
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("text"), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("Markdown"), Some(OutputFormat::Markdown));
        assert_eq!(OutputFormat::parse("yaml"), None);
    }

    #[test]
    fn test_format_messages_text_joins_content() {
        let messages = vec![Message::assistant("one"), Message::assistant("two")];
        assert_eq!(format_messages(&messages, OutputFormat::Text), "one\ntwo");
    }

    #[test]
    fn test_format_messages_json_is_parseable() {
        let messages = vec![Message::assistant("hello")];
        let json = format_messages(&messages, OutputFormat::Json);
        let parsed: Vec<Message> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, messages);
    }

    #[test]
    fn test_format_metrics_fields() {
        use crate::providers::ProviderKind;
        use std::time::Duration;
        let metrics = ResponseMetrics {
            duration: Duration::from_millis(1234),
            provider: ProviderKind::Claude,
            model: "test-model".to_string(),
        };
        let rendered = format_metrics(&metrics);
        assert!(rendered.contains("1.23s"));
        assert!(rendered.contains("claude"));
        assert!(rendered.contains("test-model"));
    }

    #[test]
    fn test_heading_renders_prefix_and_text() {
        let rendered = strip_ansi(&render_markdown("## Hello"));
        assert!(rendered.contains("## Hello"), "got {rendered:?}");
    }

    #[test]
    fn test_bold_text_is_wrapped_in_bold_codes() {
        let rendered = render_markdown("Some **bold** text");
        assert!(rendered.contains(&format!("{BOLD}bold{RESET}")), "got {rendered:?}");
    }

    #[test]
    fn test_inline_code_styled() {
        let rendered = render_markdown("Use `foo()` here");
        assert!(rendered.contains(&format!("{INLINE_CODE}foo(){RESET}")));
    }

    #[test]
    fn test_code_block_has_border_structure() {
        let rendered = strip_ansi(&render_markdown("```\nline1\nline2\n```"));
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines[0].starts_with('╭'), "expected top border, got {:?}", lines[0]);
        assert!(lines[1].starts_with("│ "), "expected │ prefix, got {:?}", lines[1]);
        assert!(lines[1].contains("line1"));
        assert!(lines[2].contains("line2"));
        let last = lines.last().unwrap();
        assert!(last.starts_with('╰'), "expected bottom border, got {:?}", last);
    }

    #[test]
    fn test_list_markers() {
        let rendered = strip_ansi(&render_markdown("- first\n- second"));
        assert!(rendered.contains("- first"));
        assert!(rendered.contains("- second"));
        let ordered = strip_ansi(&render_markdown("1. one\n2. two"));
        assert!(ordered.contains("1. one"));
        assert!(ordered.contains("2. two"));
    }

    #[test]
    fn test_link_appends_url() {
        let rendered = strip_ansi(&render_markdown("[docs](https://example.com)"));
        assert!(rendered.contains("docs (https://example.com)"), "got {rendered:?}");
    }

    #[test]
    fn test_plain_text_passes_through() {
        let rendered = strip_ansi(&render_markdown("hello world"));
        assert_eq!(rendered.trim_end(), "hello world");
    }

    #[test]
    fn test_tabs_expanded_to_spaces() {
        let rendered = strip_ansi(&render_markdown("```\n\tindented\n```"));
        assert!(rendered.contains("    indented"));
        assert!(!rendered.contains('\t'));
    }
}

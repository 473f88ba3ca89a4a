use std::sync::OnceLock;
use std::time::Instant;

use chrono::{DateTime, Local};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::{App, Mode};
use crate::clipboard::CopyTarget;
use crate::message::{Message, Role};
use crate::render::{render_message, DisplayBlock, Inline};

const PLACEHOLDER: &str = "Ask about coding, algorithms, or any DSA question...";
const COPIED: &str = "  ✓ copied";
const LINE_END: &[char] = &['\r', '\n'];

// ---------- Syntax highlighting ----------

struct Highlighting {
    syntaxes: SyntaxSet,
    theme: Theme,
}

fn highlighting() -> &'static Highlighting {
    static ASSETS: OnceLock<Highlighting> = OnceLock::new();
    ASSETS.get_or_init(|| {
        let mut themes = ThemeSet::load_defaults();
        Highlighting {
            syntaxes: SyntaxSet::load_defaults_newlines(),
            theme: themes.themes.remove("base16-eighties.dark").unwrap_or_default(),
        }
    })
}

/// Unknown languages fall back to plain text.
pub fn highlight_code(code: &str, language: &str) -> Vec<Line<'static>> {
    let hl = highlighting();
    let syntax = hl
        .syntaxes
        .find_syntax_by_token(language)
        .unwrap_or_else(|| hl.syntaxes.find_syntax_plain_text());
    let mut highlighter = HighlightLines::new(syntax, &hl.theme);

    LinesWithEndings::from(code)
        .map(|line| match highlighter.highlight_line(line, &hl.syntaxes) {
            Ok(ranges) => Line::from(
                ranges
                    .into_iter()
                    .map(|(style, text)| {
                        let fg = style.foreground;
                        Span::styled(
                            text.trim_end_matches(LINE_END).to_string(),
                            Style::default().fg(Color::Rgb(fg.r, fg.g, fg.b)),
                        )
                    })
                    .collect::<Vec<_>>(),
            ),
            Err(_) => Line::raw(line.trim_end_matches(LINE_END).to_string()),
        })
        .collect()
}

// ---------- Transcript ----------

fn heading_style(level: u8) -> Style {
    let base = Style::default().add_modifier(Modifier::BOLD);
    match level {
        1 => base.fg(Color::LightBlue).add_modifier(Modifier::UNDERLINED),
        2 => base.fg(Color::LightMagenta),
        _ => base.fg(Color::LightCyan),
    }
}

fn inline_span(inline: &Inline) -> Span<'static> {
    match inline {
        Inline::Text(t) => Span::raw(t.clone()),
        Inline::Bold(t) => Span::styled(t.clone(), Style::default().add_modifier(Modifier::BOLD)),
        Inline::Italic(t) => Span::styled(t.clone(), Style::default().add_modifier(Modifier::ITALIC)),
        Inline::Code(t) => Span::styled(t.clone(), Style::default().fg(Color::Yellow).bg(Color::DarkGray)),
    }
}

fn timestamp(m: &Message) -> String {
    DateTime::from_timestamp_millis(m.id.millis())
        .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_default()
}

fn push_message(text: &mut Text<'static>, app: &App, idx: usize, m: &Message, now: Instant) {
    let active = app.mode == Mode::Normal && app.selected() == Some(idx);
    let align = match m.role {
        Role::User => Alignment::Right,
        Role::Assistant => Alignment::Left,
    };
    let mut label_style = match m.role {
        Role::User => Style::default().fg(Color::LightMagenta).add_modifier(Modifier::BOLD),
        Role::Assistant => Style::default().fg(Color::LightBlue).add_modifier(Modifier::BOLD),
    };
    if active {
        label_style = label_style.add_modifier(Modifier::REVERSED);
    }

    let mut header = vec![
        Span::styled(m.role.label(), label_style),
        Span::styled(format!(" {}", timestamp(m)), Style::default().fg(Color::DarkGray)),
    ];
    if app.is_copied(CopyTarget::Message(idx), now) {
        header.push(Span::styled(COPIED, Style::default().fg(Color::Green)));
    }
    text.push_line(Line::from(header).alignment(align));

    let mut code_idx = 0;
    for block in render_message(&m.content) {
        match block {
            DisplayBlock::Heading { level, text: heading } => {
                text.push_line(Line::styled(heading, heading_style(level)).alignment(align));
            }
            DisplayBlock::Paragraph { spans } => {
                let spans: Vec<Span<'static>> = spans.iter().map(inline_span).collect();
                text.push_line(Line::from(spans).alignment(align));
            }
            DisplayBlock::CodeBlock { language, code } => {
                let target = CopyTarget::CodeBlock { message: idx, block: code_idx };
                code_idx += 1;
                let mut top = vec![Span::styled(
                    format!("┌─ {language} [{code_idx}]"),
                    Style::default().fg(Color::DarkGray),
                )];
                if app.is_copied(target, now) {
                    top.push(Span::styled(COPIED, Style::default().fg(Color::Green)));
                }
                text.push_line(Line::from(top));
                for line in highlight_code(&code, &language) {
                    let mut spans = vec![Span::styled("│ ", Style::default().fg(Color::DarkGray))];
                    spans.extend(line.spans);
                    text.push_line(Line::from(spans));
                }
                text.push_line(Line::styled("└─", Style::default().fg(Color::DarkGray)));
            }
        }
    }
    text.push_line(Line::raw(""));
}

// ---------- Wrapping ----------

/// Splits `s` into alternating runs of whitespace and non-whitespace.
fn word_runs(s: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut prev_ws = None;
    for (i, ch) in s.char_indices() {
        let ws = ch.is_whitespace();
        if prev_ws.is_some_and(|p| p != ws) {
            runs.push(&s[start..i]);
            start = i;
        }
        prev_ws = Some(ws);
    }
    if start < s.len() {
        runs.push(&s[start..]);
    }
    runs
}

/// Breaks `line` into rows no wider than `width` columns, at word
/// boundaries where possible. Styles and alignment carry over to every row.
pub fn wrap_line(line: Line<'static>, width: usize) -> Vec<Line<'static>> {
    if width == 0 || line.width() <= width {
        return vec![line];
    }
    let Line { spans, style, alignment } = line;

    let mut rows: Vec<Vec<Span<'static>>> = vec![Vec::new()];
    let mut used = 0;
    for span in spans {
        for run in word_runs(&span.content) {
            let run_width = run.width();
            if used > 0 && used + run_width > width {
                rows.push(Vec::new());
                used = 0;
                // the break eats the gap
                if run.trim().is_empty() {
                    continue;
                }
            }
            if run_width <= width {
                if let Some(row) = rows.last_mut() {
                    row.push(Span::styled(run.to_string(), span.style));
                }
                used += run_width;
                continue;
            }
            // a single run wider than the pane: hard break by character
            let mut piece = String::new();
            for ch in run.chars() {
                let cw = ch.width().unwrap_or(0);
                if used > 0 && used + cw > width {
                    if let Some(row) = rows.last_mut() {
                        row.push(Span::styled(std::mem::take(&mut piece), span.style));
                    }
                    rows.push(Vec::new());
                    used = 0;
                }
                piece.push(ch);
                used += cw;
            }
            if let Some(row) = rows.last_mut() {
                row.push(Span::styled(piece, span.style));
            }
        }
    }

    rows.into_iter()
        .map(|spans| Line { spans, style, alignment })
        .collect()
}

/// Transcript rows, wrapped to `width`, plus the first row of each message.
pub fn transcript_text(app: &App, width: u16, now: Instant) -> (Text<'static>, Vec<u16>) {
    let mut text = Text::default();
    let mut offsets = Vec::with_capacity(app.chat.transcript().len());
    for (i, m) in app.chat.transcript().messages().iter().enumerate() {
        offsets.push(u16::try_from(text.lines.len()).unwrap_or(u16::MAX));
        let mut lines = Text::default();
        push_message(&mut lines, app, i, m, now);
        for line in lines.lines {
            text.lines.extend(wrap_line(line, usize::from(width)));
        }
    }
    (text, offsets)
}

// ---------- Layout ----------

pub fn draw_ui(frame: &mut Frame, app: &mut App, now: Instant) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(5),
        ])
        .split(frame.size());

    draw_header(frame, chunks[0]);
    draw_transcript(frame, chunks[1], app, now);
    draw_status(frame, chunks[2], app);
    draw_input(frame, chunks[3], app);
}

fn draw_header(frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::raw("💪 "),
        Span::styled("GogginsGPT", Style::default().fg(Color::LightMagenta).add_modifier(Modifier::BOLD)),
    ]);
    let header = Paragraph::new(title)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(header, area);
}

fn draw_transcript(frame: &mut Frame, area: Rect, app: &mut App, now: Instant) {
    app.chat_inner_height = area.height.saturating_sub(2);
    let inner_width = area.width.saturating_sub(2);

    let (text, offsets) = transcript_text(app, inner_width, now);
    let total = u16::try_from(text.height()).unwrap_or(u16::MAX);
    let max_scroll = total.saturating_sub(app.chat_inner_height);
    if app.follow_tail {
        app.chat_scroll = max_scroll;
    } else {
        app.chat_scroll = app.chat_scroll.min(max_scroll);
        app.follow_tail = app.chat_scroll == max_scroll;
    }
    app.message_offsets = offsets;

    let mode_span = match app.mode {
        Mode::Insert => Span::styled("[INSERT]", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
        Mode::Normal => Span::styled("[NORMAL]", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Line::from(vec![Span::raw("Chat "), mode_span]));

    let body = if app.chat.transcript().is_empty() {
        Paragraph::new(Line::styled("No messages yet. Stay hard.", Style::default().fg(Color::DarkGray)))
    } else {
        Paragraph::new(text).scroll((app.chat_scroll, 0))
    };
    frame.render_widget(body.block(block), area);
}

fn draw_status(frame: &mut Frame, area: Rect, app: &App) {
    let line = if app.chat.is_sending() {
        Line::styled(
            "⟳ Generating response...",
            Style::default().fg(Color::LightBlue).add_modifier(Modifier::BOLD),
        )
    } else if let Some(err) = app.chat.error() {
        Line::from(vec![
            Span::styled(err.to_string(), Style::default().fg(Color::LightRed).add_modifier(Modifier::BOLD)),
            Span::styled("  (x to dismiss)", Style::default().fg(Color::DarkGray)),
        ])
    } else {
        Line::raw("")
    };
    frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), area);
}

fn draw_input(frame: &mut Frame, area: Rect, app: &App) {
    let title: Line = match app.mode {
        Mode::Insert => Line::from(vec![
            Span::raw("Message "),
            Span::styled("[INSERT] ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
            Span::raw("(Enter send, Alt+Enter newline, Esc navigate)"),
        ]),
        Mode::Normal => Line::from(vec![
            Span::raw("Navigation "),
            Span::styled("[NORMAL] ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            Span::raw("(i type, j/k select, y copy, 1-9 copy code, G bottom, q quit)"),
        ]),
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    let input = &app.chat.input;
    let body = if input.is_empty() {
        Paragraph::new(Line::styled(PLACEHOLDER, Style::default().fg(Color::DarkGray)))
    } else {
        Paragraph::new(input.as_str())
    };
    frame.render_widget(body.block(block), area);

    if app.mode == Mode::Insert {
        let rows = input.split('\n').count().max(1) as u16;
        let last = input.rsplit('\n').next().unwrap_or("");
        let x = area.x + 1 + (last.chars().count() as u16).min(area.width.saturating_sub(3));
        let y = area.y + rows.min(area.height.saturating_sub(2));
        frame.set_cursor(x, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ChatController, ErrorDisplay};

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn highlight_keeps_code_text() {
        let lines = highlight_code("fn main() {\n    println!(\"hi\");\n}", "rust");
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["fn main() {", "    println!(\"hi\");", "}"]);

        let plain = highlight_code("x = 1", "no-such-language");
        assert_eq!(plain.iter().map(line_text).collect::<Vec<_>>(), vec!["x = 1"]);
    }

    #[test]
    fn transcript_offsets_point_at_message_headers() {
        let mut chat = ChatController::new(true, ErrorDisplay::Banner);
        chat.input = "Explain recursion".into();
        chat.submit();
        chat.complete(Ok("## Wake-Up Call\n```python\ndef f(n):\n    return f(n - 1)\n```".into()));
        let app = App::new(chat);

        let (text, offsets) = transcript_text(&app, 80, Instant::now());
        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets[0], 0);
        // user: header + one paragraph + spacer
        assert_eq!(offsets[1], 3);
        assert!(line_text(&text.lines[3]).starts_with("Goggins"));
        assert_eq!(line_text(&text.lines[4]), "Wake-Up Call");
        // the newline before the fence is an empty paragraph
        assert_eq!(line_text(&text.lines[5]), "");
        assert_eq!(line_text(&text.lines[6]), "┌─ python [1]");
        assert_eq!(line_text(&text.lines[7]), "│ def f(n):");
    }

    #[test]
    fn wrap_line_breaks_at_words_and_keeps_style() {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let line = Line::from(vec![Span::raw("stay hard "), Span::styled("every day", bold)])
            .alignment(Alignment::Right);

        let rows = wrap_line(line.clone(), 10);
        assert_eq!(rows.iter().map(line_text).collect::<Vec<_>>(), vec!["stay hard ", "every day"]);
        assert!(rows.iter().all(|r| r.alignment == Some(Alignment::Right)));
        assert_eq!(rows[1].spans[0].style, bold);

        assert_eq!(wrap_line(line.clone(), 80), vec![line.clone()]);
        assert_eq!(wrap_line(line, 0).len(), 1);

        let long = wrap_line(Line::raw("abcdefghij"), 4);
        assert_eq!(long.iter().map(line_text).collect::<Vec<_>>(), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn tail_of_a_wrapped_answer_is_on_screen() {
        use ratatui::{backend::TestBackend, Terminal};

        let long = "word ".repeat(60);
        let answer = format!("{long}\n{long}\n{long}\nLASTLINE");
        let mut chat = ChatController::new(true, ErrorDisplay::Banner);
        chat.input = "Push me".into();
        chat.submit();
        chat.complete(Ok(answer));
        let mut app = App::new(chat);

        let mut terminal = Terminal::new(TestBackend::new(40, 24)).unwrap();
        let now = Instant::now();
        terminal.draw(|f| draw_ui(f, &mut app, now)).unwrap();

        let screen: String = terminal.backend().buffer().content.iter().map(|c| c.symbol()).collect();
        assert!(screen.contains("LASTLINE"), "last line scrolled out of view");
        assert!(app.follow_tail);
        assert!(app.message_offsets[1] > 0);
    }
}

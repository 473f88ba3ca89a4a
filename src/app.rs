use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{debug, info, warn};

use crate::api::{ApiError, AskRequest};
use crate::clipboard::{ClipboardSink, CopyFeedback, CopyTarget};
use crate::controller::ChatController;
use crate::render::nth_code_block;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Insert,
}

pub struct App {
    pub chat: ChatController,
    pub mode: Mode,
    pub selected_msg: Option<usize>,

    // transcript viewport, refreshed on every draw
    pub chat_scroll: u16,
    pub chat_inner_height: u16,
    pub follow_tail: bool,
    pub message_offsets: Vec<u16>,

    pub copied: Option<CopyFeedback>,
    pub quit: bool,
}

impl App {
    pub fn new(chat: ChatController) -> Self {
        Self {
            chat,
            mode: Mode::Insert,
            selected_msg: None,
            chat_scroll: 0,
            chat_inner_height: 0,
            follow_tail: true,
            message_offsets: Vec::new(),
            copied: None,
            quit: false,
        }
    }

    /// Selected message index; defaults to the newest one.
    pub fn selected(&self) -> Option<usize> {
        let len = self.chat.transcript().len();
        if len == 0 {
            return None;
        }
        Some(self.selected_msg.unwrap_or(len - 1).min(len - 1))
    }

    pub fn is_copied(&self, target: CopyTarget, now: Instant) -> bool {
        self.copied.is_some_and(|fb| fb.is_lit(target, now))
    }

    pub fn on_tick(&mut self, now: Instant) {
        if self.copied.is_some_and(|fb| fb.expired(now)) {
            self.copied = None;
        }
    }

    pub fn on_answer(&mut self, result: Result<String, ApiError>) {
        let outcome = self.chat.complete(result);
        debug!(?outcome, "request finished");
        self.selected_msg = None;
        self.follow_tail = true;
    }

    /// Returns a request when the key submitted a question.
    pub fn handle_key(
        &mut self,
        key: KeyEvent,
        clipboard: &mut dyn ClipboardSink,
        now: Instant,
    ) -> Option<AskRequest> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if key.code == KeyCode::Char('c') && ctrl {
            self.quit = true;
            return None;
        }

        match self.mode {
            Mode::Insert => match key.code {
                KeyCode::Esc => self.mode = Mode::Normal,
                KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => self.chat.input.push('\n'),
                KeyCode::Char('j') if ctrl => self.chat.input.push('\n'),
                KeyCode::Enter => {
                    let request = self.chat.submit();
                    if request.is_some() {
                        self.selected_msg = None;
                        self.follow_tail = true;
                    }
                    return request;
                }
                KeyCode::Backspace => {
                    self.chat.input.pop();
                }
                KeyCode::Char(c) if !ctrl => self.chat.input.push(c),
                KeyCode::Tab => self.chat.input.push('\t'),
                KeyCode::Up => self.scroll_up(),
                KeyCode::Down => self.scroll_down(),
                _ => {}
            },
            Mode::Normal => match key.code {
                KeyCode::Char('q') => self.quit = true,
                KeyCode::Char('i') => self.mode = Mode::Insert,
                KeyCode::Char('j') => self.move_selection(1),
                KeyCode::Char('k') => self.move_selection(-1),
                KeyCode::Char('G') => {
                    self.selected_msg = None;
                    self.follow_tail = true;
                }
                KeyCode::Char('x') => self.chat.dismiss_error(),
                KeyCode::Char('y') => {
                    if let Some(i) = self.selected() {
                        self.copy(CopyTarget::Message(i), clipboard, now);
                    }
                }
                KeyCode::Char(d @ '1'..='9') => {
                    if let (Some(message), Some(n)) = (self.selected(), d.to_digit(10)) {
                        let block = n as usize - 1;
                        self.copy(CopyTarget::CodeBlock { message, block }, clipboard, now);
                    }
                }
                KeyCode::Up => self.scroll_up(),
                KeyCode::Down => self.scroll_down(),
                _ => {}
            },
        }
        None
    }

    fn copy(&mut self, target: CopyTarget, clipboard: &mut dyn ClipboardSink, now: Instant) {
        let transcript = self.chat.transcript();
        let text = match target {
            CopyTarget::Message(i) => transcript.get(i).map(|m| m.content.clone()),
            CopyTarget::CodeBlock { message, block } => transcript
                .get(message)
                .and_then(|m| nth_code_block(&m.content, block)),
        };
        let Some(text) = text else {
            debug!(?target, "nothing to copy");
            return;
        };
        match clipboard.set_text(&text) {
            Ok(()) => {
                info!(?target, chars = text.chars().count(), "copied to clipboard");
                self.copied = Some(CopyFeedback::new(target, now));
            }
            Err(e) => warn!("clipboard write failed: {e:#}"),
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let Some(cur) = self.selected() else { return };
        let last = self.chat.transcript().len() - 1;
        let next = cur.saturating_add_signed(delta).min(last);
        self.selected_msg = Some(next);

        // minimal selection scrolling: align to start if off-screen
        let Some(&target_y) = self.message_offsets.get(next) else { return };
        let top = self.chat_scroll;
        let bottom = top.saturating_add(self.chat_inner_height.max(1));
        if target_y < top || target_y >= bottom {
            self.chat_scroll = target_y;
            self.follow_tail = false;
        }
    }

    fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
        self.follow_tail = false;
    }

    fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::{anyhow, Result};

    use super::*;
    use crate::clipboard::COPY_FEEDBACK;
    use crate::controller::ErrorDisplay;

    #[derive(Default)]
    struct FakeClipboard {
        written: Vec<String>,
        broken: bool,
    }

    impl ClipboardSink for FakeClipboard {
        fn set_text(&mut self, text: &str) -> Result<()> {
            if self.broken {
                return Err(anyhow!("no display"));
            }
            self.written.push(text.to_string());
            Ok(())
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app() -> App {
        App::new(ChatController::new(true, ErrorDisplay::Banner))
    }

    fn type_text(app: &mut App, cb: &mut FakeClipboard, text: &str) {
        for c in text.chars() {
            app.handle_key(key(KeyCode::Char(c)), cb, Instant::now());
        }
    }

    fn answered(text: &str, answer: &str) -> App {
        let mut app = app();
        let mut cb = FakeClipboard::default();
        type_text(&mut app, &mut cb, text);
        app.handle_key(key(KeyCode::Enter), &mut cb, Instant::now()).expect("submitted");
        app.on_answer(Ok(answer.to_string()));
        app
    }

    #[test]
    fn enter_submits_typed_question_once() {
        let mut app = app();
        let mut cb = FakeClipboard::default();
        type_text(&mut app, &mut cb, "Explain recursion");

        let request = app.handle_key(key(KeyCode::Enter), &mut cb, Instant::now());
        assert_eq!(request.map(|r| r.question).as_deref(), Some("Explain recursion"));
        assert!(app.chat.is_sending());

        type_text(&mut app, &mut cb, "again");
        assert!(app.handle_key(key(KeyCode::Enter), &mut cb, Instant::now()).is_none());
        assert_eq!(app.chat.transcript().len(), 1);
    }

    #[test]
    fn newline_keys_do_not_submit() {
        let mut app = app();
        let mut cb = FakeClipboard::default();
        type_text(&mut app, &mut cb, "line one");
        let alt_enter = KeyEvent::new(KeyCode::Enter, KeyModifiers::ALT);
        assert!(app.handle_key(alt_enter, &mut cb, Instant::now()).is_none());
        type_text(&mut app, &mut cb, "two");
        let ctrl_j = KeyEvent::new(KeyCode::Char('j'), KeyModifiers::CONTROL);
        app.handle_key(ctrl_j, &mut cb, Instant::now());
        assert_eq!(app.chat.input, "line one\ntwo\n");
        assert!(app.chat.transcript().is_empty());
    }

    #[test]
    fn q_types_in_insert_and_quits_in_normal() {
        let mut app = app();
        let mut cb = FakeClipboard::default();
        app.handle_key(key(KeyCode::Char('q')), &mut cb, Instant::now());
        assert!(!app.quit);
        assert_eq!(app.chat.input, "q");

        app.handle_key(key(KeyCode::Esc), &mut cb, Instant::now());
        app.handle_key(key(KeyCode::Char('q')), &mut cb, Instant::now());
        assert!(app.quit);
    }

    #[test]
    fn ctrl_c_quits_from_any_mode() {
        let mut app = app();
        let mut cb = FakeClipboard::default();
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        app.handle_key(ctrl_c, &mut cb, Instant::now());
        assert!(app.quit);
        assert!(app.chat.input.is_empty());
    }

    #[test]
    fn y_copies_selected_message_and_lights_marker() {
        let mut app = answered("Q", "Answer text");
        let mut cb = FakeClipboard::default();
        let t0 = Instant::now();
        app.handle_key(key(KeyCode::Esc), &mut cb, t0);
        app.handle_key(key(KeyCode::Char('y')), &mut cb, t0);
        assert_eq!(cb.written, vec!["Answer text".to_string()]);
        assert!(app.is_copied(CopyTarget::Message(1), t0));

        app.handle_key(key(KeyCode::Char('k')), &mut cb, t0);
        app.handle_key(key(KeyCode::Char('y')), &mut cb, t0);
        assert_eq!(cb.written.last().map(String::as_str), Some("Q"));
        assert!(!app.is_copied(CopyTarget::Message(1), t0));
        assert!(app.is_copied(CopyTarget::Message(0), t0));
    }

    #[test]
    fn digit_copies_code_block_and_marker_expires() {
        let mut app = answered("Q", "## Code Example\n```python\nprint('stay hard')\n```\n\n```sh\nls\n```");
        let mut cb = FakeClipboard::default();
        let t0 = Instant::now();
        app.handle_key(key(KeyCode::Esc), &mut cb, t0);
        app.handle_key(key(KeyCode::Char('2')), &mut cb, t0);
        app.handle_key(key(KeyCode::Char('3')), &mut cb, t0);
        assert_eq!(cb.written, vec!["ls".to_string()], "missing block copies nothing");

        let target = CopyTarget::CodeBlock { message: 1, block: 1 };
        assert!(app.is_copied(target, t0 + Duration::from_millis(500)));
        app.on_tick(t0 + COPY_FEEDBACK);
        assert!(app.copied.is_none());
    }

    #[test]
    fn failed_clipboard_leaves_marker_off() {
        let mut app = answered("Q", "A");
        let mut cb = FakeClipboard { broken: true, ..Default::default() };
        app.handle_key(key(KeyCode::Esc), &mut cb, Instant::now());
        app.handle_key(key(KeyCode::Char('y')), &mut cb, Instant::now());
        assert!(app.copied.is_none());
    }

    #[test]
    fn selection_moves_within_bounds_and_scrolls_into_view() {
        let mut app = answered("Q", "A");
        let mut cb = FakeClipboard::default();
        app.message_offsets = vec![0, 40];
        app.chat_inner_height = 10;
        app.chat_scroll = 0;
        app.handle_key(key(KeyCode::Esc), &mut cb, Instant::now());

        app.handle_key(key(KeyCode::Char('k')), &mut cb, Instant::now());
        app.handle_key(key(KeyCode::Char('k')), &mut cb, Instant::now());
        assert_eq!(app.selected(), Some(0));

        app.handle_key(key(KeyCode::Char('j')), &mut cb, Instant::now());
        app.handle_key(key(KeyCode::Char('j')), &mut cb, Instant::now());
        assert_eq!(app.selected(), Some(1));
        assert_eq!(app.chat_scroll, 40);
        assert!(!app.follow_tail);
    }

    #[test]
    fn x_dismisses_error_banner() {
        let mut app = app();
        let mut cb = FakeClipboard::default();
        type_text(&mut app, &mut cb, "Q");
        app.handle_key(key(KeyCode::Enter), &mut cb, Instant::now());
        app.on_answer(Err(crate::api::ApiError::Status {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            detail: None,
        }));
        assert_eq!(app.chat.error(), Some("Failed to get response"));
        assert!(app.chat.transcript().is_empty());

        app.handle_key(key(KeyCode::Esc), &mut cb, Instant::now());
        app.handle_key(key(KeyCode::Char('x')), &mut cb, Instant::now());
        assert_eq!(app.chat.error(), None);
    }
}

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use arboard::Clipboard;

/// How long a "copied" marker stays lit.
pub const COPY_FEEDBACK: Duration = Duration::from_secs(2);

pub trait ClipboardSink {
    fn set_text(&mut self, text: &str) -> Result<()>;
}

/// System clipboard. Opened per copy, the handle is not kept around.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl ClipboardSink for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<()> {
        let mut cb = Clipboard::new().context("open clipboard")?;
        cb.set_text(text.to_string()).context("write clipboard")?;
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CopyTarget {
    /// Whole message at this transcript index.
    Message(usize),
    /// `block`-th code block of the message at `message`.
    CodeBlock { message: usize, block: usize },
}

#[derive(Copy, Clone, Debug)]
pub struct CopyFeedback {
    target: CopyTarget,
    at: Instant,
}

impl CopyFeedback {
    pub fn new(target: CopyTarget, at: Instant) -> Self {
        Self { target, at }
    }

    pub fn is_lit(&self, target: CopyTarget, now: Instant) -> bool {
        self.target == target && !self.expired(now)
    }

    pub fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.at) >= COPY_FEEDBACK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_lights_only_its_target_and_expires() {
        let t0 = Instant::now();
        let fb = CopyFeedback::new(CopyTarget::CodeBlock { message: 1, block: 0 }, t0);

        assert!(fb.is_lit(CopyTarget::CodeBlock { message: 1, block: 0 }, t0));
        assert!(!fb.is_lit(CopyTarget::CodeBlock { message: 1, block: 1 }, t0));
        assert!(!fb.is_lit(CopyTarget::Message(1), t0));

        let later = t0 + Duration::from_millis(1999);
        assert!(!fb.expired(later));
        assert!(fb.expired(t0 + COPY_FEEDBACK));
        assert!(!fb.is_lit(CopyTarget::CodeBlock { message: 1, block: 0 }, t0 + COPY_FEEDBACK));
    }
}

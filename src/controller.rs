//! Chat controller: transcript, input buffer and the submit state machine.
//!
//! `Idle -> Sending -> (answer | failure) -> Idle`. A submission appends the
//! user message up front; a failed request rolls it back again so the
//! transcript only ever holds confirmed exchanges.

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::api::{ApiError, AskRequest};
use crate::message::{MessageId, Role, Transcript};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorDisplay {
    #[default]
    Banner,
    Transcript,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Sending { pending: MessageId },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Answered,
    Failed { message: String },
    /// Completion arrived with nothing in flight.
    Ignored,
}

#[derive(Debug)]
pub struct ChatController {
    transcript: Transcript,
    pub input: String,
    state: ChatState,
    error: Option<String>,
    send_context: bool,
    error_display: ErrorDisplay,
}

impl ChatController {
    pub fn new(send_context: bool, error_display: ErrorDisplay) -> Self {
        Self {
            transcript: Transcript::new(),
            input: String::new(),
            state: ChatState::Idle,
            error: None,
            send_context,
            error_display,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_sending(&self) -> bool {
        matches!(self.state, ChatState::Sending { .. })
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Idle -> Sending. Returns the one request to issue, or `None` when the
    /// input is blank or a request is already in flight.
    pub fn submit(&mut self) -> Option<AskRequest> {
        if let ChatState::Sending { pending } = self.state {
            debug!(?pending, "submit rejected, request in flight");
            return None;
        }
        if self.input.trim().is_empty() {
            return None;
        }

        self.error = None;
        let question = std::mem::take(&mut self.input);
        let context = self.send_context.then(|| self.transcript.joined_contents());
        let pending = self.transcript.push(Role::User, question.clone());
        self.state = ChatState::Sending { pending };
        info!(?pending, chars = question.chars().count(), "question submitted");

        Some(AskRequest { question, context })
    }

    /// Sending -> Idle, by way of success or failure.
    pub fn complete(&mut self, result: Result<String, ApiError>) -> Outcome {
        let ChatState::Sending { pending } = self.state else {
            warn!("completion arrived while idle, dropping it");
            return Outcome::Ignored;
        };
        self.state = ChatState::Idle;

        match result {
            Ok(answer) => {
                let id = self.transcript.push(Role::Assistant, answer);
                info!(?id, "answer received");
                Outcome::Answered
            }
            Err(err) => {
                let message = err.to_string();
                self.roll_back(pending);
                warn!(error = %message, "question failed");
                match self.error_display {
                    ErrorDisplay::Banner => self.error = Some(message.clone()),
                    ErrorDisplay::Transcript => {
                        self.transcript.push_error(format!("Error: {message}"));
                    }
                }
                Outcome::Failed { message }
            }
        }
    }

    fn roll_back(&mut self, pending: MessageId) {
        if self.transcript.rollback(pending).is_none() {
            warn!(?pending, "pending message was not the newest entry");
        }
    }
}

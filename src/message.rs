use chrono::Utc;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "Goggins",
        }
    }
}

/// Ordering key for a message: creation time in epoch milliseconds, bumped
/// when two messages land on the same tick.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(i64);

impl MessageId {
    pub fn millis(self) -> i64 {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    /// Client-side error notice shown in the transcript; never sent as context.
    pub is_error: bool,
}

/// Append-only conversation log. The only way to remove an entry is
/// [`Transcript::rollback`], and only for the newest one.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Message> {
        self.messages.get(idx)
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) -> MessageId {
        self.append(role, content.into(), false)
    }

    /// Appends an assistant-side error notice.
    pub fn push_error(&mut self, content: impl Into<String>) -> MessageId {
        self.append(Role::Assistant, content.into(), true)
    }

    fn append(&mut self, role: Role, content: String, is_error: bool) -> MessageId {
        let id = self.next_id(Utc::now().timestamp_millis());
        self.messages.push(Message { id, role, content, is_error });
        id
    }

    /// Removes the newest message if it is `id`. Anything else is left alone.
    pub fn rollback(&mut self, id: MessageId) -> Option<Message> {
        match self.messages.last() {
            Some(last) if last.id == id => self.messages.pop(),
            _ => None,
        }
    }

    /// Prior message contents joined with newlines, sent as request context.
    /// Error notices are skipped.
    pub fn joined_contents(&self) -> String {
        self.messages
            .iter()
            .filter(|m| !m.is_error)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn next_id(&self, now_ms: i64) -> MessageId {
        match self.messages.last() {
            Some(last) if last.id.0 >= now_ms => MessageId(last.id.0 + 1),
            _ => MessageId(now_ms),
        }
    }
}

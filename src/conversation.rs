//! Append-only message log shared with the presentation layer.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::watch;

/// Who authored a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
    User,
    Assistant,
    Status,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub text: String,
}

impl Message {
    pub fn new(kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

#[derive(Debug, Default)]
struct LogInner {
    messages: Vec<Message>,
    /// Position of the assistant message currently receiving fragments.
    open: Option<usize>,
}

/// Ordered message log.
///
/// At most one assistant message is open for appending; it is addressed by
/// position. Every mutation bumps a revision observers can wait on.
#[derive(Debug, Clone)]
pub struct MessageLog {
    inner: Arc<RwLock<LogInner>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageLog {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(LogInner::default())),
            revision: Arc::new(revision),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, LogInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LogInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    pub fn push(&self, kind: MessageKind, text: impl Into<String>) {
        self.write().messages.push(Message::new(kind, text));
        self.bump();
    }

    pub fn push_user(&self, text: impl Into<String>) {
        self.push(MessageKind::User, text);
    }

    pub fn push_status(&self, text: impl Into<String>) {
        self.push(MessageKind::Status, text);
    }

    pub fn push_error(&self, text: impl Into<String>) {
        self.push(MessageKind::Error, text);
    }

    /// Open a new empty assistant message, closing any previous one.
    pub fn open_assistant(&self) -> usize {
        let index = {
            let mut inner = self.write();
            inner
                .messages
                .push(Message::new(MessageKind::Assistant, String::new()));
            let index = inner.messages.len() - 1;
            inner.open = Some(index);
            index
        };
        self.bump();
        index
    }

    /// Append a fragment to the open assistant message.
    ///
    /// Returns `false` when no message is open.
    pub fn append_to_open(&self, fragment: &str) -> bool {
        if fragment.is_empty() {
            return self.read().open.is_some();
        }
        let appended = {
            let mut inner = self.write();
            match inner.open {
                Some(index) => {
                    inner.messages[index].text.push_str(fragment);
                    true
                }
                None => false,
            }
        };
        if appended {
            self.bump();
        }
        appended
    }

    pub fn close_assistant(&self) {
        self.write().open = None;
    }

    pub fn has_open_assistant(&self) -> bool {
        self.read().open.is_some()
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.read().messages.clone()
    }

    pub fn last(&self) -> Option<Message> {
        self.read().messages.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, kind: MessageKind) -> usize {
        self.read()
            .messages
            .iter()
            .filter(|message| message.kind == kind)
            .count()
    }

    /// Receiver that changes whenever the log is mutated.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

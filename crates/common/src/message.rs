//! Message sink used by resources to report missing files, decode failures and
//! upload failures.
//!
//! Sinks live on the owner thread. Background work never reports directly; it
//! stores its error in the resource and the owner thread reports it during
//! finalize.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;

/// Severity of a reported message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageLevel {
    Error,
    Warning,
    /// Noteworthy but expected, e.g. a view change requested by the user.
    Attention,
    Normal,
}

impl MessageLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Attention => "attention",
            Self::Normal => "normal",
        }
    }
}

impl std::fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reported message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub level: MessageLevel,
    pub text: String,
}

/// Receiver of user-facing messages.
pub trait MessageSink {
    fn message(&self, level: MessageLevel, text: &str);

    fn error(&self, text: &str) {
        self.message(MessageLevel::Error, text);
    }

    fn warning(&self, text: &str) {
        self.message(MessageLevel::Warning, text);
    }

    fn attention(&self, text: &str) {
        self.message(MessageLevel::Attention, text);
    }

    fn normal(&self, text: &str) {
        self.message(MessageLevel::Normal, text);
    }
}

/// Forwards every message to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn message(&self, level: MessageLevel, text: &str) {
        emit(level, text);
    }
}

fn emit(level: MessageLevel, text: &str) {
    match level {
        MessageLevel::Error => tracing::error!(target: "sensorview::message", "{text}"),
        MessageLevel::Warning => tracing::warn!(target: "sensorview::message", "{text}"),
        MessageLevel::Attention => tracing::info!(target: "sensorview::message", "{text}"),
        MessageLevel::Normal => tracing::debug!(target: "sensorview::message", "{text}"),
    }
}

/// Records messages in arrival order and forwards them to `tracing`.
///
/// Used by the CLI report and by tests that assert on reported failures.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: RefCell<Vec<Message>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all messages recorded so far.
    pub fn entries(&self) -> Vec<Message> {
        self.entries.borrow().clone()
    }

    /// Messages of exactly the given level.
    pub fn at_level(&self, level: MessageLevel) -> Vec<Message> {
        self.entries
            .borrow()
            .iter()
            .filter(|m| m.level == level)
            .cloned()
            .collect()
    }

    pub fn count(&self, level: MessageLevel) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|m| m.level == level)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Drain and return all recorded messages.
    pub fn drain(&self) -> Vec<Message> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }
}

impl MessageSink for MessageLog {
    fn message(&self, level: MessageLevel, text: &str) {
        emit(level, text);
        self.entries.borrow_mut().push(Message {
            level,
            text: text.to_string(),
        });
    }
}

//! User-facing notifications (transient info / warning / error messages).

use serde::Serialize;
use std::sync::Mutex;

/// Prefix of every user-visible message.
pub const MESSAGE_PREFIX: &str = "Comment Notes: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Channel for messages meant for the person at the keyboard.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);

    fn info(&self, message: &str) {
        self.notify(NoticeLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.notify(NoticeLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.notify(NoticeLevel::Error, message);
    }
}

/// Format a message with an optional underlying cause.
pub fn with_cause(message: &str, cause: Option<&dyn std::fmt::Display>) -> String {
    match cause {
        Some(cause) => format!("{}{} ({})", MESSAGE_PREFIX, message, cause),
        None => format!("{}{}", MESSAGE_PREFIX, message),
    }
}

/// Routes notices to `tracing` at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => tracing::info!("{}", message),
            NoticeLevel::Warning => tracing::warn!("{}", message),
            NoticeLevel::Error => tracing::error!("{}", message),
        }
    }
}

/// Keeps every notice in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn has_errors(&self) -> bool {
        self.notices()
            .iter()
            .any(|n| n.level == NoticeLevel::Error)
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Notice {
                level,
                message: message.to_string(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_cause() {
        assert_eq!(
            with_cause("Failed to read comment.json", Some(&"EOF while parsing")),
            "Comment Notes: Failed to read comment.json (EOF while parsing)"
        );
        assert_eq!(with_cause("Comment deleted.", None), "Comment Notes: Comment deleted.");
    }

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.info("saved");
        notifier.error("broken");
        assert!(notifier.has_errors());
        let drained = notifier.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].level, NoticeLevel::Info);
        assert!(notifier.notices().is_empty());
    }
}

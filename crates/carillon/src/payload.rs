//! Reminder payload parsing.
//!
//! Payloads are opaque strings at every boundary; this is the single
//! place that gives them a best-effort JSON shape. Malformed payloads
//! never block delivery: every accessor has a generic fallback.

use serde::Deserialize;

/// Best-effort parsed reminder payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReminderPayload {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub task_title: Option<String>,
    #[serde(default)]
    pub task_note: Option<String>,
}

impl ReminderPayload {
    /// Parse a raw payload. Any failure (missing payload, invalid
    /// JSON, wrong shape) yields the empty payload, whose accessors
    /// return generic text.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|r| serde_json::from_str(r).ok())
            .unwrap_or_default()
    }

    /// The task identifier, if present and non-empty.
    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Notification title, with a generic fallback.
    pub fn title(&self) -> &str {
        match self.task_title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => "Task Reminder",
        }
    }

    /// Notification body. Prefers the note, then a nudge when at least
    /// a title is known, then the generic tap prompt.
    pub fn body(&self) -> &str {
        match self.task_note.as_deref() {
            Some(n) if !n.trim().is_empty() => n,
            _ => {
                if self.task_title.as_deref().is_some_and(|t| !t.trim().is_empty()) {
                    "It's time to do this task."
                } else {
                    "Tap to view your reminder"
                }
            }
        }
    }

    /// Short utterance for the speech side channel.
    pub fn speech_text(&self) -> &str {
        match self.task_title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => "You have a reminder",
        }
    }
}

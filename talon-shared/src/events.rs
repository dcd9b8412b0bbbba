use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of an operator-facing status line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// One line of the live status stream a presentation layer renders.
/// Emitted per state transition, scan summary, idle wait and terminal success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub at: DateTime<Utc>,
    pub level: StatusLevel,
    pub message: String,
}

impl StatusEvent {
    pub fn now(level: StatusLevel, message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

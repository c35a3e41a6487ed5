//! Stream event types

use serde::{Deserialize, Serialize};

/// Discriminator for the three kinds of events a session emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Intermediate business event
    Progress,
    /// Terminal frame on success
    Complete,
    /// Terminal frame on failure
    Error,
}

/// An event pushed to the client as one `data:` frame
///
/// Serializes as `{"step": .., "message": .., "data": ..}` with `data`
/// omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Event kind, not part of the wire payload
    #[serde(skip, default = "default_kind")]
    pub kind: EventKind,

    /// Step label (e.g. "step_1", "complete", "error")
    pub step: String,

    /// Human-readable message
    pub message: String,

    /// Opaque business payload
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<serde_json::Value>,
}

fn default_kind() -> EventKind {
    EventKind::Progress
}

impl StreamEvent {
    /// Create a progress event
    pub fn progress(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Progress,
            step: step.into(),
            message: message.into(),
            data: None,
        }
    }

    /// Create the terminal success event
    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Complete,
            step: "complete".to_string(),
            message: message.into(),
            data: None,
        }
    }

    /// Create the terminal failure event
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            step: "error".to_string(),
            message: message.into(),
            data: None,
        }
    }

    /// Attach a payload
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        self.kind != EventKind::Progress
    }
}

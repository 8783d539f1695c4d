/*
[INPUT]:  Raw custom events emitted by the vendor widget
[OUTPUT]: Parsed WidgetEvent variants
[POS]:    Widget layer - event parsing with a catch-all for vendor additions
[UPDATE]: When the vendor adds event kinds the flow must react to
*/

use serde::{Deserialize, Serialize};

pub const VERIFICATION_COMPLETE: &str = "verification_complete";
pub const VERIFICATION_ERROR: &str = "verification_error";

/// Event exactly as it crosses the widget boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawWidgetEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RawWidgetEvent {
    pub fn new(kind: impl Into<String>, message: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            message,
        }
    }
}

/// Widget event kinds the flow knows about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    Complete,
    Error { message: Option<String> },
    Unknown { kind: String },
}

impl WidgetEvent {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, WidgetEvent::Unknown { .. })
    }
}

impl From<RawWidgetEvent> for WidgetEvent {
    fn from(raw: RawWidgetEvent) -> Self {
        match raw.kind.as_str() {
            VERIFICATION_COMPLETE => WidgetEvent::Complete,
            VERIFICATION_ERROR => WidgetEvent::Error {
                message: raw.message,
            },
            _ => WidgetEvent::Unknown { kind: raw.kind },
        }
    }
}

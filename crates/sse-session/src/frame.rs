//! SSE frame encoding
//!
//! Every frame ends with a blank line. Data frames carry a single line of
//! compact JSON; comment frames start with `: ` and are never delivered to
//! the client's event handler.

use bytes::Bytes;

use crate::event::StreamEvent;

/// Encode a business event as `data: <json>\n\n`
pub fn encode(event: &StreamEvent) -> Bytes {
    // Compact serde_json output escapes control characters, so the payload
    // is always a single line.
    let payload = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(step = %event.step, error = %e, "Failed to serialize event payload");
            serde_json::json!({ "step": event.step, "message": event.message }).to_string()
        }
    };
    Bytes::from(format!("data: {}\n\n", payload))
}

/// Encode a comment frame as `: <token>\n\n`
pub fn comment(token: &str) -> Bytes {
    let token: String = token
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    Bytes::from(format!(": {}\n\n", token))
}

/// Collect the JSON payloads of every `data:` line in a received stream
///
/// Comment lines and malformed payloads are skipped, mirroring what a browser
/// `EventSource` hands to `onmessage`.
pub fn parse_data_lines(text: &str) -> Vec<serde_json::Value> {
    text.split("\n\n")
        .flat_map(|frame| frame.lines())
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|json| serde_json::from_str(json).ok())
        .collect()
}

/// Count comment frames carrying exactly `token`
pub fn count_comments(text: &str, token: &str) -> usize {
    text.split("\n\n")
        .filter(|frame| frame.strip_prefix(": ") == Some(token))
        .count()
}

//! Terminal rendering of the chat history

use std::fmt::Write as _;

use crate::api::ChatEntry;

/// Render the chat history as a plain-text transcript, oldest first
#[must_use]
pub fn render_history(entries: &[ChatEntry]) -> String {
    if entries.is_empty() {
        return "No chat history yet.\n".to_string();
    }

    let mut out = String::new();
    for entry in entries {
        let when = entry.timestamp.format("%Y-%m-%d %H:%M:%S");
        let _ = writeln!(out, "[{when}]");
        let _ = writeln!(out, "  You:   {}", entry.user_query.trim());
        let _ = writeln!(out, "  Agent: {}", entry.ai_response.trim());
        out.push('\n');
    }
    out
}

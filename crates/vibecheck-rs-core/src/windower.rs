//! Context windows over a persona's message history.

use crate::error::VibeCheckError;
use vibecheck_rs_protocol::{Message, Window};

/// Build one window per message, centered on it and clamped at the edges.
///
/// Window text renders each message in range as `sender: text`, one per line.
pub fn build_windows(
    persona_id: &str,
    messages: &[Message],
    radius: usize,
) -> Result<Vec<Window>, VibeCheckError> {
    if messages.is_empty() {
        return Err(VibeCheckError::InvalidInput(format!(
            "cannot window an empty history for {persona_id}"
        )));
    }
    let last = messages.len() - 1;
    Ok(messages
        .iter()
        .enumerate()
        .map(|(center, _)| {
            let start = center.saturating_sub(radius);
            let end = center.saturating_add(radius).min(last);
            let span = &messages[start..=end];
            Window {
                id: window_id(persona_id, center),
                persona_id: persona_id.to_string(),
                center_index: center,
                text: render_lines(span),
                source_message_ids: span.iter().map(|message| message.id.clone()).collect(),
            }
        })
        .collect())
}

pub fn window_id(persona_id: &str, center: usize) -> String {
    format!("{persona_id}:{center:06}")
}

/// `sender: text` lines, the format shared by windows and retrieval queries.
pub fn render_lines(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|message| format!("{}: {}", message.sender_id, message.text))
        .collect::<Vec<_>>()
        .join("\n")
}

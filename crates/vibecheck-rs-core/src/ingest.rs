//! Export parsing and normalization into canonical messages.

use crate::error::VibeCheckError;
use vibecheck_rs_protocol::{ExportDocument, ExportRecord, Message};

/// Sender label for records that are explicitly not from the persona.
pub const COUNTERPART_SENDER: &str = "them";

const ATTACHMENT_PLACEHOLDER: char = '\u{FFFC}';

/// Parse an export file: a JSON array of records or an object with `messages`.
pub fn parse_export(json: &str) -> Result<Vec<ExportRecord>, VibeCheckError> {
    serde_json::from_str::<ExportDocument>(json)
        .map(ExportDocument::into_records)
        .map_err(|err| VibeCheckError::InvalidInput(format!("unrecognized export format: {err}")))
}

/// Turn raw records into ordered messages for `persona_id`.
///
/// Records that are empty after cleaning are skipped; an export with nothing
/// left is rejected.
pub fn normalize_export(
    persona_id: &str,
    records: &[ExportRecord],
) -> Result<Vec<Message>, VibeCheckError> {
    let mut messages = Vec::with_capacity(records.len());
    for record in records {
        let text = clean_text(record.text());
        if text.is_empty() {
            continue;
        }
        let position = messages.len() + 1;
        let (id, sender_id) = match record {
            ExportRecord::Plain(_) => (None, persona_id.to_string()),
            ExportRecord::Object {
                sender_id,
                id,
                is_from_me,
                ..
            } => {
                let sender = match (sender_id, is_from_me) {
                    (Some(sender), _) if !sender.trim().is_empty() => sender.trim().to_string(),
                    (_, Some(false)) => COUNTERPART_SENDER.to_string(),
                    _ => persona_id.to_string(),
                };
                (id.clone().filter(|id| !id.trim().is_empty()), sender)
            }
        };
        messages.push(Message {
            id: id.unwrap_or_else(|| format!("{persona_id}-m{position}")),
            sender_id,
            text,
            timestamp_seq: position as u64,
        });
    }
    if messages.is_empty() {
        return Err(VibeCheckError::InvalidInput(format!(
            "export for {persona_id} contains no usable messages"
        )));
    }
    Ok(messages)
}

/// Drop attachment placeholders and collapse whitespace runs.
pub fn clean_text(text: &str) -> String {
    text.replace(ATTACHMENT_PLACEHOLDER, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Persona ids become file and namespace names, so they stay ASCII-safe.
pub fn validate_persona_id(persona_id: &str) -> Result<(), VibeCheckError> {
    let valid = !persona_id.is_empty()
        && persona_id.len() <= 64
        && persona_id
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_');
    if valid {
        Ok(())
    } else {
        Err(VibeCheckError::InvalidInput(format!(
            "persona id must be 1-64 ASCII letters, digits, '-' or '_': {persona_id:?}"
        )))
    }
}

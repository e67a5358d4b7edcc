use serde::{Deserialize, Serialize};

/// One entry of a raw message export.
///
/// Exports come either as bare strings or as objects with optional metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ExportRecord {
    /// Message text only; the sender is the exporting persona.
    Plain(String),
    /// Message object.
    Object {
        text: String,
        #[serde(default, alias = "sender", skip_serializing_if = "Option::is_none")]
        sender_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_from_me: Option<bool>,
    },
}

impl ExportRecord {
    /// Raw message text.
    pub fn text(&self) -> &str {
        match self {
            Self::Plain(text) => text,
            Self::Object { text, .. } => text,
        }
    }
}

/// Top-level shape of an export file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ExportDocument {
    /// A bare array of records.
    List(Vec<ExportRecord>),
    /// An object wrapping the records under `messages`.
    Wrapped { messages: Vec<ExportRecord> },
}

impl ExportDocument {
    /// Consume the document and return its records.
    pub fn into_records(self) -> Vec<ExportRecord> {
        match self {
            Self::List(records) => records,
            Self::Wrapped { messages } => messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExportDocument, ExportRecord};
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_mixed_records_in_wrapped_document() {
        let raw = r#"{"messages": ["hey", {"text": "yo", "sender": "sam", "is_from_me": false}]}"#;
        let document: ExportDocument = serde_json::from_str(raw).expect("parse");
        let records = document.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], ExportRecord::Plain("hey".to_string()));
        assert_eq!(
            records[1],
            ExportRecord::Object {
                text: "yo".to_string(),
                sender_id: Some("sam".to_string()),
                id: None,
                is_from_me: Some(false),
            }
        );
    }

    #[test]
    fn parses_bare_array() {
        let document: ExportDocument = serde_json::from_str(r#"["a", "b"]"#).expect("parse");
        let texts: Vec<_> = document
            .into_records()
            .iter()
            .map(|record| record.text().to_string())
            .collect();
        assert_eq!(texts, vec!["a", "b"]);
    }
}

//! Conversation export: JSON, Markdown, and plain-text transcripts.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::{ConversationHistory, ConversationSummary};
use super::message::{Message, Sender};
use crate::error::{Error, Result};

/// Output format for [`export_conversation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Full-fidelity JSON document.
    #[default]
    Json,
    /// Human-readable transcript with sender/time/mode headers.
    Markdown,
    /// `[timestamp] SENDER: text` lines.
    Text,
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "txt" | "text" => Ok(ExportFormat::Text),
            other => Err(Error::config(format!("unknown export format: {other}"))),
        }
    }
}

/// The JSON export document.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConversationExport {
    pub conversation: Vec<Message>,
    pub summary: ConversationSummary,
    pub exported_at: DateTime<Utc>,
}

impl ConversationExport {
    pub fn from_history(history: &ConversationHistory) -> Self {
        Self {
            conversation: history.messages().to_vec(),
            summary: history.summary(),
            exported_at: Utc::now(),
        }
    }
}

/// Render `history` in `format`.
pub fn export_conversation(history: &ConversationHistory, format: ExportFormat) -> Result<String> {
    let data = ConversationExport::from_history(history);
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(&data)
            .map_err(|e| Error::Decode(format!("failed to serialize conversation: {e}"))),
        ExportFormat::Markdown => Ok(to_markdown(&data)),
        ExportFormat::Text => Ok(to_text(&data)),
    }
}

/// Parse a JSON export back into its document form.
pub fn parse_json_export(json: &str) -> Result<ConversationExport> {
    serde_json::from_str(json).map_err(|e| Error::Decode(e.to_string()))
}

fn sender_label(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "User",
        Sender::Ai => "AI",
        Sender::System => "System",
    }
}

fn to_markdown(data: &ConversationExport) -> String {
    let mut md = format!("# Conversation - {}\n\n", data.exported_at.format("%Y-%m-%d"));
    for msg in &data.conversation {
        md.push_str(&format!(
            "## **{}** ({}) [{}]\n\n{}\n\n",
            sender_label(msg.sender),
            msg.timestamp.format("%H:%M:%S"),
            msg.mode,
            msg.text
        ));
    }
    md.push_str(&format!(
        "---\n**Summary**: {} messages, {}s\n",
        data.summary.total_messages, data.summary.duration
    ));
    md
}

fn to_text(data: &ConversationExport) -> String {
    data.conversation
        .iter()
        .map(|msg| {
            format!(
                "[{}] {}: {}",
                msg.timestamp.format("%Y-%m-%d %H:%M:%S"),
                msg.sender.to_string().to_uppercase(),
                msg.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

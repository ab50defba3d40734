//! Document analysis on the platform backend.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::transport::{Transport, send_json};
use crate::error::{Error, Result};

pub const ANALYZE_ENDPOINT: &str = "/documents/analyze";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    document_content: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

/// What the backend reports about a document.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub sentiment: Option<String>,
    /// Document length in characters, as measured by the backend.
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Deserialize)]
struct AnalyzeReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    analysis: Option<DocumentAnalysis>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone)]
pub struct DocumentClient {
    transport: Arc<dyn Transport>,
    auth_token: Option<String>,
}

impl DocumentClient {
    pub fn new(transport: Arc<dyn Transport>, auth_token: Option<String>) -> Self {
        Self {
            transport,
            auth_token,
        }
    }

    /// Analyze `content`; `kind` names the document type (`text`, `pdf`, ...).
    pub async fn analyze_document(&self, content: &str, kind: &str) -> Result<DocumentAnalysis> {
        debug!("Analyzing {kind} document: {} chars", content.chars().count());
        let reply: AnalyzeReply = send_json(
            self.transport.as_ref(),
            ANALYZE_ENDPOINT,
            &AnalyzeRequest {
                document_content: content,
                kind,
            },
            self.auth_token.as_deref(),
        )
        .await?;

        if !reply.success {
            return Err(Error::provider(
                reply.error.unwrap_or_else(|| "document analysis failed".into()),
            ));
        }
        reply
            .analysis
            .ok_or_else(|| Error::provider("document analysis returned no result"))
    }
}

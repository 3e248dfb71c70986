use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::document::Document;

/// Server-side pipeline stage a batch job enqueues documents for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Preprocess,
    Ocr,
}

impl BatchStage {
    pub fn path(self) -> &'static str {
        match self {
            Self::Preprocess => "/documents/process-batch",
            Self::Ocr => "/documents/process-batch-ocr",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub document_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub processed_ids: Vec<String>,
    /// Per-id reasons for documents the server refused to enqueue.
    #[serde(default)]
    pub errors: HashMap<String, String>,
}

/// Upload responses come wrapped as `{document}`; older gateways return the bare document.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum UploadResponse {
    Wrapped { document: Document },
    Bare(Document),
}

impl UploadResponse {
    pub(crate) fn into_document(self) -> Document {
        match self {
            Self::Wrapped { document } | Self::Bare(document) => document,
        }
    }
}

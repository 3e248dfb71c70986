use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Processing stage of a document on the server.
///
/// Forward order: `Uploaded -> QueuedPreprocess -> Preprocessing -> QueuedOcr -> Ocr -> Completed`.
/// `Failed` is reachable from any non-terminal state. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    #[serde(alias = "queued_preprocessing")]
    QueuedPreprocess,
    Preprocessing,
    QueuedOcr,
    Ocr,
    Completed,
    Failed,
}

/// How a status observed later relates to one observed earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Forward,
    Regression,
}

impl DocumentStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Uploaded => 0,
            Self::QueuedPreprocess => 1,
            Self::Preprocessing => 2,
            Self::QueuedOcr => 3,
            Self::Ocr => 4,
            Self::Completed => 5,
            Self::Failed => 6,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn transition_to(self, next: DocumentStatus) -> Transition {
        if self == next {
            return Transition::Unchanged;
        }
        if self.is_terminal() {
            return Transition::Regression;
        }
        if next == Self::Failed || next.rank() > self.rank() {
            Transition::Forward
        } else {
            Transition::Regression
        }
    }

    /// A preprocessed image exists for documents in this state.
    pub fn has_preprocessed(self) -> bool {
        matches!(self, Self::QueuedOcr | Self::Ocr | Self::Completed)
    }

    pub fn ocr_eligible(self) -> bool {
        self.has_preprocessed()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::QueuedPreprocess => "queued_preprocess",
            Self::Preprocessing => "preprocessing",
            Self::QueuedOcr => "queued_ocr",
            Self::Ocr => "ocr",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub status: DocumentStatus,
    #[serde(default)]
    pub ocr_text: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// RFC 3339, or a naive timestamp (the gateway's `DateTime` columns) read as UTC.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

const DEFAULT_FAILURE: &str = "Processing failed";

impl Document {
    /// Enforce that `error_message` is present exactly when the status is `failed`.
    pub fn normalized(mut self) -> Self {
        if self.status == DocumentStatus::Failed {
            if self.error_message.as_deref().is_none_or(|m| m.trim().is_empty()) {
                self.error_message = Some(DEFAULT_FAILURE.to_string());
            }
        } else {
            self.error_message = None;
        }
        self
    }

    pub fn failure_reason(&self) -> Option<&str> {
        (self.status == DocumentStatus::Failed)
            .then_some(self.error_message.as_deref())
            .flatten()
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    /// Which binary to show in a preview: the preprocessed image once it exists.
    pub fn preview_variant(&self) -> BinaryVariant {
        if self.status.has_preprocessed() {
            BinaryVariant::Preprocessed
        } else {
            BinaryVariant::Original
        }
    }

    /// OCR text, only once the document has completed.
    pub fn extracted_text(&self) -> Option<&str> {
        (self.status == DocumentStatus::Completed)
            .then_some(self.ocr_text.as_deref())
            .flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryVariant {
    Original,
    Preprocessed,
}

impl BinaryVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Preprocessed => "preprocessed",
        }
    }
}

/// Which documents of the listing a dashboard subscription tracks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
    pub content_type_prefix: Option<String>,
    pub statuses: Option<Vec<DocumentStatus>>,
}

impl DocumentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Images awaiting or past preprocessing.
    pub fn preprocess_view() -> Self {
        Self {
            content_type_prefix: Some("image/".to_string()),
            statuses: None,
        }
    }

    /// Images that were preprocessed, or ended up failed.
    pub fn ocr_view() -> Self {
        Self {
            content_type_prefix: Some("image/".to_string()),
            statuses: Some(vec![
                DocumentStatus::QueuedOcr,
                DocumentStatus::Ocr,
                DocumentStatus::Completed,
                DocumentStatus::Failed,
            ]),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(prefix) = self.content_type_prefix.as_deref()
            && !doc.content_type.starts_with(prefix)
        {
            return false;
        }
        self.statuses
            .as_ref()
            .is_none_or(|allowed| allowed.contains(&doc.status))
    }
}

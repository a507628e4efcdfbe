//! Data models for fetched tweets and run results.
//!
//! - [`TweetRecord`]: one row from the hosted `tweets` table
//! - [`GenerationResult`]: the outcome of a single pipeline run
//!
//! Row fields use the table's snake_case column names; the run result is
//! serialized in camelCase for console and JSON consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single ingested tweet as returned by the hosted table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TweetRecord {
    pub id: i64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub list_id: Option<ListId>,
}

impl TweetRecord {
    /// Content with surrounding whitespace removed, `None` when blank.
    pub fn text(&self) -> Option<&str> {
        non_blank(self.content.as_deref())
    }

    /// URL with surrounding whitespace removed, `None` when blank.
    pub fn link(&self) -> Option<&str> {
        non_blank(self.url.as_deref())
    }

    /// Publication time, falling back to the ingestion time.
    pub fn published(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Identifier of the list a tweet was ingested from.
///
/// Older rows store a numeric id, newer ones a UUID string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ListId {
    Number(i64),
    Text(String),
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListId::Number(n) => write!(f, "{n}"),
            ListId::Text(s) => f.write_str(s),
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub success: bool,
    pub file_path: String,
    pub report_content: String,
    pub metadata: GenerationMetadata,
    pub summary: GenerationSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub tweets_processed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSummary {
    /// Elapsed wall time, e.g. `"1.25s"`.
    pub duration: String,
}

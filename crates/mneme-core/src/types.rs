//! Records, queries and results shared by the store, the engine and callers.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::Local;
use serde::{Deserialize, Serialize};

/// What a memory record represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    #[default]
    Fact,
    ToolOutput,
    Query,
    System,
    Preference,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::ToolOutput => "tool_output",
            Self::Query => "query",
            Self::System => "system",
            Self::Preference => "preference",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(Self::Fact),
            "tool_output" => Ok(Self::ToolOutput),
            "query" => Ok(Self::Query),
            "system" => Ok(Self::System),
            "preference" => Ok(Self::Preference),
            other => Err(format!("unknown record kind: {other}")),
        }
    }
}

/// Current local time as ISO-8601.
pub fn now_timestamp() -> String {
    Local::now().to_rfc3339()
}

/// One page-level memory record, as kept in `data.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub timestamp: String,
}

impl MemoryRecord {
    pub fn new(url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
            kind: RecordKind::Fact,
            session_id: None,
            tags: BTreeSet::new(),
            timestamp: now_timestamp(),
        }
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// One indexed chunk, as kept in `metadata.json`. Position `i` in that file
/// corresponds to point `i` in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub chunk: String,
    pub chunk_id: String,
    pub timestamp: String,
    #[serde(rename = "type", default)]
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl ChunkRecord {
    /// Chunk `index` of `page`, carrying the page's kind, session and tags.
    pub fn from_page(page: &MemoryRecord, index: usize, chunk: String) -> Self {
        Self {
            url: page.url.clone(),
            title: page.title.clone(),
            chunk,
            chunk_id: format!("{}_{}", page.url, index),
            timestamp: now_timestamp(),
            kind: page.kind,
            session_id: page.session_id.clone(),
            tags: page.tags.clone(),
        }
    }
}

/// Optional narrowing of a search. Every supplied filter must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, rename = "type_filter")]
    pub kind: Option<RecordKind>,
    /// Every listed tag must be present on the record.
    #[serde(default, rename = "tag_filter")]
    pub tags: Vec<String>,
    /// Records without a session never match a session filter.
    #[serde(default, rename = "session_filter")]
    pub session_id: Option<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.tags.is_empty() && self.session_id.is_none()
    }

    pub fn matches(&self, record: &ChunkRecord) -> bool {
        if self.kind.is_some_and(|k| k != record.kind) {
            return false;
        }
        if !self.tags.iter().all(|t| record.tags.contains(t)) {
            return false;
        }
        match &self.session_id {
            Some(s) => record.session_id.as_deref() == Some(s.as_str()),
            None => true,
        }
    }
}

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(rename = "query")]
    pub text: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(flatten)]
    pub filters: SearchFilters,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: DEFAULT_TOP_K,
            filters: SearchFilters::default(),
        }
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// A ranked hit.
///
/// `score` is the squared L2 distance between query and chunk embeddings:
/// **lower is better**. Results arrive sorted by ascending score.
/// `highlight_start`/`highlight_end` are character (not byte) offsets into `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub content: String,
    pub score: f32,
    pub highlight_start: usize,
    pub highlight_end: usize,
    pub chunk_id: String,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Default characters of context on each side of a preview.
pub const DEFAULT_PREVIEW_MARGIN: usize = 50;

impl SearchResult {
    /// The highlighted span of `content`.
    pub fn highlighted(&self) -> &str {
        char_slice(&self.content, self.highlight_start, self.highlight_end)
    }

    /// The highlighted span widened by `margin` characters on each side.
    pub fn preview(&self, margin: usize) -> &str {
        char_slice(
            &self.content,
            self.highlight_start.saturating_sub(margin),
            self.highlight_end.saturating_add(margin),
        )
    }
}

/// Slice by character offsets, clamped to the string.
pub fn char_slice(s: &str, start: usize, end: usize) -> &str {
    let byte_at = |n: usize| s.char_indices().nth(n).map_or(s.len(), |(i, _)| i);
    let (b0, b1) = (byte_at(start), byte_at(end));
    if b0 >= b1 {
        return "";
    }
    &s[b0..b1]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total_matches: usize,
    /// Set when the search degraded to an empty result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Answer synthesized from the results by a planner, if one was asked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
}

impl SearchResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            total_matches: 0,
            message: Some(message.into()),
            final_answer: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_pages: usize,
    pub total_embeddings: usize,
    pub last_updated: String,
    pub index_size_bytes: u64,
}

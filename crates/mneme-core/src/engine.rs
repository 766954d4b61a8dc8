//! The retrieval engine: semantic memory over web pages.
//!
//! Ingestion: dedup check → chunk → embed each chunk → insert into the chunk
//! index → append the page → persist. Query: embed → nearest neighbours →
//! highlight → ranked results.
//!
//! All mutation happens inside one write lock (insert + append + persist), and
//! embedding happens before the lock is taken, so a timed-out provider leaves
//! the memory untouched. Searches share a read lock and never see the vector
//! index ahead of the chunk records.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use tokio::sync::RwLock;

use crate::cache::{content_hash, ContentCache};
use crate::chunks::Chunker;
use crate::embed::{embed_with_timeout, Embedder};
use crate::error::MemoryError;
use crate::highlight;
use crate::persist::MemoryDir;
use crate::store::{ChunkIndex, PageAppend, PageStore};
use crate::types::{
    now_timestamp, ChunkRecord, IndexStats, MemoryRecord, SearchQuery, SearchResponse, SearchResult,
};

pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Only this many leading characters of a chunk are scanned for highlights.
const MAX_HIGHLIGHT_CHARS: usize = 64 * 1024;

/// What [`MemoryEngine::add`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// New or changed content was chunked and embedded.
    Indexed { chunks: usize },
    /// Same content hash as last time; nothing re-embedded.
    Unchanged,
    /// Empty content; nothing stored.
    Skipped,
    /// The fetcher refused the page (private, internal or unreachable).
    Unindexable(String),
}

#[derive(Debug, Default)]
struct State {
    pages: PageStore,
    chunks: ChunkIndex,
    cache: ContentCache,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub chunker: Chunker,
    pub embed_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            chunker: Chunker::default(),
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
        }
    }
}

pub struct MemoryEngine {
    embedder: Arc<dyn Embedder>,
    dir: MemoryDir,
    options: EngineOptions,
    state: RwLock<State>,
}

impl MemoryEngine {
    /// Opens (or starts) the memory stored in `dir`.
    pub fn open(
        dir: MemoryDir,
        embedder: Arc<dyn Embedder>,
        options: EngineOptions,
    ) -> Result<Self, MemoryError> {
        let mut snapshot = dir.load()?;
        let mut chunks = ChunkIndex::from_parts(snapshot.index, snapshot.chunks);
        let repair = chunks.repair();
        if !repair.is_noop() {
            let urls = repair.affected_urls();
            for url in &urls {
                snapshot.cache.forget(url);
            }
            tracing::warn!(
                vectors_dropped = repair.vectors_dropped,
                records_dropped = repair.records_dropped.len(),
                pages_to_reembed = urls.len(),
                dir = %dir.root().display(),
                "index and chunk metadata had drifted; trimmed to the common length"
            );
        }
        Ok(Self {
            embedder,
            dir,
            options,
            state: RwLock::new(State {
                pages: PageStore::from_records(snapshot.pages),
                chunks,
                cache: snapshot.cache,
            }),
        })
    }

    pub fn dir(&self) -> &MemoryDir {
        &self.dir
    }

    /// Adds a page: stores it once per URL and (re-)embeds its chunks when its
    /// content hash changed.
    pub async fn add(&self, record: MemoryRecord) -> Result<AddOutcome, MemoryError> {
        if !record.has_content() {
            tracing::debug!(url = %record.url, "skipping record with empty content");
            return Ok(AddOutcome::Skipped);
        }
        let hash = content_hash(&record.content);
        if self.state.read().await.cache.is_unchanged(&record.url, &hash) {
            tracing::info!(url = %record.url, "skipping unchanged page");
            return self.store_page_only(record).await;
        }

        let texts: Vec<String> = self.options.chunker.chunks(&record.content).collect();
        let mut entries = Vec::with_capacity(texts.len());
        for (i, text) in texts.into_iter().enumerate() {
            let vector = embed_with_timeout(self.embedder.as_ref(), &text, self.options.embed_timeout).await?;
            entries.push((ChunkRecord::from_page(&record, i, text), vector));
        }

        let mut state = self.state.write().await;
        // Another writer may have indexed the same content while we were embedding.
        if state.cache.is_unchanged(&record.url, &hash) {
            drop(state);
            return self.store_page_only(record).await;
        }
        let count = entries.len();
        let url = record.url.clone();
        if state.pages.is_duplicate(&record) {
            tracing::debug!(url = %url, "content changed for a known URL; re-embedding chunks only");
        }
        state.chunks.insert_batch(entries)?;
        state.cache.record(url.clone(), hash);
        log_page_append(&url, state.pages.append(record));
        self.persist(&state)?;
        tracing::info!(url = %url, chunks = count, total = state.chunks.len(), "indexed page");
        Ok(AddOutcome::Indexed { chunks: count })
    }

    async fn store_page_only(&self, record: MemoryRecord) -> Result<AddOutcome, MemoryError> {
        let mut state = self.state.write().await;
        let url = record.url.clone();
        let appended = state.pages.append(record);
        log_page_append(&url, appended);
        if matches!(appended, PageAppend::Appended | PageAppend::Backfilled) {
            self.dir.save_pages(state.pages.records())?;
        }
        Ok(AddOutcome::Unchanged)
    }

    /// Adds each record in turn; one failure does not stop the rest.
    pub async fn add_batch(
        &self,
        records: Vec<MemoryRecord>,
    ) -> Vec<Result<AddOutcome, MemoryError>> {
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let url = record.url.clone();
            let res = self.add(record).await;
            if let Err(e) = &res {
                tracing::warn!(url = %url, error = %e, "failed to add record");
            }
            out.push(res);
        }
        out
    }

    fn persist(&self, state: &State) -> Result<(), MemoryError> {
        self.dir.save(
            state.pages.records(),
            state.chunks.vectors(),
            state.chunks.records(),
            &state.cache,
        )?;
        Ok(())
    }

    /// Writes the in-memory state again, e.g. after a failed persist.
    pub async fn flush(&self) -> Result<(), MemoryError> {
        // Write lock: persists share temp file names.
        let state = self.state.write().await;
        self.persist(&state)
    }

    /// Searches memory. Never fails: errors degrade to an empty response with a message.
    ///
    /// Results are ordered by ascending `score` (squared L2 distance; lower is
    /// better) and are not truncated to `top_k`.
    pub async fn search(&self, query: &SearchQuery) -> SearchResponse {
        match self.try_search(query).await {
            Ok(res) => res,
            Err(e) => {
                tracing::warn!(query = %query.text, error = %e, "search degraded to empty result");
                SearchResponse::degraded(format!("search failed: {e}"))
            }
        }
    }

    /// [`MemoryEngine::search`] with the typed error.
    pub async fn try_search(&self, query: &SearchQuery) -> Result<SearchResponse, MemoryError> {
        if self.state.read().await.chunks.is_empty() {
            return Ok(SearchResponse::empty());
        }
        let query_vec =
            embed_with_timeout(self.embedder.as_ref(), &query.text, self.options.embed_timeout).await?;

        let state = self.state.read().await;
        let hits = state.chunks.nearest(&query_vec, query.top_k.saturating_mul(2))?;
        let mut results = Vec::with_capacity(hits.len());
        for (position, distance) in hits {
            let Some(record) = state.chunks.record(position) else {
                tracing::warn!(position, records = state.chunks.record_count(), "hit beyond chunk records");
                continue;
            };
            if !query.filters.matches(record) {
                continue;
            }
            results.push(to_result(record, distance, &query.text));
        }
        Ok(SearchResponse {
            total_matches: results.len(),
            results,
            message: None,
            final_answer: None,
        })
    }

    pub async fn stats(&self) -> IndexStats {
        let state = self.state.read().await;
        let last_updated = latest_timestamp(
            state
                .chunks
                .records()
                .iter()
                .map(|c| c.timestamp.as_str())
                .chain(state.pages.records().iter().map(|p| p.timestamp.as_str())),
        )
        .map(str::to_string)
        .unwrap_or_else(now_timestamp);
        IndexStats {
            total_pages: state.pages.len(),
            total_embeddings: state.chunks.len(),
            last_updated,
            index_size_bytes: self.dir.index_size_bytes(),
        }
    }

    /// Number of vectors and chunk records. Equal after every open and insert.
    pub async fn sizes(&self) -> (usize, usize) {
        let state = self.state.read().await;
        (state.chunks.len(), state.chunks.record_count())
    }

    pub async fn page(&self, url: &str) -> Option<MemoryRecord> {
        self.state.read().await.pages.get(url).cloned()
    }
}

fn log_page_append(url: &str, appended: PageAppend) {
    match appended {
        PageAppend::Appended => tracing::debug!(url, "stored page"),
        PageAppend::Backfilled => tracing::debug!(url, "back-filled page title/content"),
        PageAppend::Duplicate => tracing::debug!(url, "page already stored; keeping first content"),
        PageAppend::Rejected => tracing::debug!(url, "page rejected: empty content"),
    }
}

/// The latest of `timestamps` by instant, not by text. Unparseable entries are ignored.
fn latest_timestamp<'a>(timestamps: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    timestamps
        .filter_map(|t| DateTime::parse_from_rfc3339(t).ok().map(|at| (at, t)))
        .max_by_key(|(at, _)| *at)
        .map(|(_, t)| t)
}

/// At most the first [`MAX_HIGHLIGHT_CHARS`] characters of `content`.
fn highlight_scope(content: &str) -> &str {
    match content.char_indices().nth(MAX_HIGHLIGHT_CHARS) {
        Some((cut, _)) => &content[..cut],
        None => content,
    }
}

fn to_result(record: &ChunkRecord, distance: f32, query: &str) -> SearchResult {
    let (highlight_start, highlight_end) = highlight::locate(highlight_scope(&record.chunk), query);
    SearchResult {
        url: record.url.clone(),
        title: record.title.clone(),
        content: record.chunk.clone(),
        score: distance,
        highlight_start,
        highlight_end,
        chunk_id: record.chunk_id.clone(),
        kind: record.kind,
        session_id: record.session_id.clone(),
        tags: record.tags.clone(),
    }
}

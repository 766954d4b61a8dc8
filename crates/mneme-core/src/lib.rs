//! Semantic web memory, independent of how it is driven (CLI or an agent loop).
//!
//! Pages are chunked, embedded through an injected [`Embedder`], and kept in an
//! exact vector index whose positions line up with the chunk records. Searches
//! return the nearest chunks with a highlight span marking the best match.
//! Mneme stores its files in a memory directory (see [persist]).

pub mod app_data;
pub mod cache;
pub mod chunks;
pub mod config;
pub mod embed;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod highlight;
pub mod ingest;
pub mod ollama;
pub mod persist;
pub mod planner;
pub mod store;
pub mod types;
pub mod vector;

pub use app_data::app_data_dir;
pub use cache::{content_hash, ContentCache};
pub use chunks::{chunk_text, ChunkError, Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use config::{load_config, save_config, set_memory_dir, Config, ConfigError};
pub use embed::{EmbedError, Embedder};
pub use engine::{AddOutcome, EngineOptions, MemoryEngine};
pub use error::MemoryError;
pub use fetch::{FetchedPage, Fetcher, HttpFetcher};
pub use ingest::Ingestor;
pub use ollama::{OllamaClient, OllamaError};
pub use persist::{MemoryDir, PersistError};
pub use planner::{answer_query, decide, Decision, PlanError, Planner};
pub use store::{ChunkIndex, PageAppend, PageStore};
pub use types::{
    ChunkRecord, IndexStats, MemoryRecord, RecordKind, SearchFilters, SearchQuery, SearchResponse,
    SearchResult,
};
pub use vector::{IndexError, VectorIndex};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "mneme-core ready"
}

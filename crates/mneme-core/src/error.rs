//! Engine-level failures. Module errors fold into these four kinds.

use crate::embed::EmbedError;
use crate::persist::PersistError;
use crate::vector::IndexError;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Provider unreachable, failed or timed out. Nothing was modified.
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),
    /// Dimension mismatch or index/store drift. Surfaced, never patched over.
    #[error("index corrupt: {0}")]
    IndexCorrupt(String),
    /// Empty or disallowed content. Callers treat this as a skip.
    #[error("content not indexable: {0}")]
    ContentUnindexable(String),
    /// Disk I/O failed. In-memory state is still valid; a retry may persist it.
    #[error("persistence failed: {0}")]
    PersistenceFailure(PersistError),
}

impl MemoryError {
    /// Skips are not failures: the batch should simply move on.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::ContentUnindexable(_))
    }
}

/// Unreadable contents of a stored file are corruption; failed I/O is not.
impl From<PersistError> for MemoryError {
    fn from(e: PersistError) -> Self {
        match e {
            PersistError::Index(
                e @ (IndexError::Format(_)
                | IndexError::DimensionMismatch { .. }
                | IndexError::EmptyVector),
            ) => Self::IndexCorrupt(e.to_string()),
            e @ PersistError::Parse(..) => Self::IndexCorrupt(e.to_string()),
            e => Self::PersistenceFailure(e),
        }
    }
}

impl From<EmbedError> for MemoryError {
    fn from(e: EmbedError) -> Self {
        Self::EmbeddingUnavailable(e.to_string())
    }
}

impl From<IndexError> for MemoryError {
    fn from(e: IndexError) -> Self {
        Self::IndexCorrupt(e.to_string())
    }
}

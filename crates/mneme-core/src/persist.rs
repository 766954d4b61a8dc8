//! On-disk layout of one memory directory:
//!
//! - `data.json`: page-level records, unique by URL
//! - `index.bin`: the vector index
//! - `metadata.json`: chunk records, aligned with `index.bin` by position
//! - `webpage_cache.json`: `url -> content hash`
//!
//! Every file is written to a sibling temp file and renamed into place.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::ContentCache;
use crate::types::{ChunkRecord, MemoryRecord};
use crate::vector::{IndexError, VectorIndex};

pub const DATA_FILE: &str = "data.json";
pub const INDEX_FILE: &str = "index.bin";
pub const METADATA_FILE: &str = "metadata.json";
pub const CACHE_FILE: &str = "webpage_cache.json";

/// Everything a memory directory holds, loaded together.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub pages: Vec<MemoryRecord>,
    pub index: VectorIndex,
    pub chunks: Vec<ChunkRecord>,
    pub cache: ContentCache,
}

#[derive(Debug, Clone)]
pub struct MemoryDir {
    root: PathBuf,
}

impl MemoryDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_path(&self) -> PathBuf {
        self.root.join(DATA_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.root.join(CACHE_FILE)
    }

    /// Loads all four files. Missing files load as empty.
    pub fn load(&self) -> Result<Snapshot, PersistError> {
        let snapshot = Snapshot {
            pages: read_json(&self.data_path())?.unwrap_or_default(),
            index: VectorIndex::load(&self.index_path()).map_err(PersistError::Index)?,
            chunks: read_json(&self.metadata_path())?.unwrap_or_default(),
            cache: read_json(&self.cache_path())?.unwrap_or_default(),
        };
        tracing::debug!(
            dir = %self.root.display(),
            pages = snapshot.pages.len(),
            vectors = snapshot.index.len(),
            chunks = snapshot.chunks.len(),
            "loaded memory snapshot"
        );
        Ok(snapshot)
    }

    /// Writes all four files. The index goes first and the dedup cache last, so
    /// a failed write never leaves a cache entry for chunks that were not saved.
    /// Any leftover length mismatch is trimmed by [`ChunkIndex::repair`] on open.
    ///
    /// [`ChunkIndex::repair`]: crate::store::ChunkIndex::repair
    pub fn save(
        &self,
        pages: &[MemoryRecord],
        index: &VectorIndex,
        chunks: &[ChunkRecord],
        cache: &ContentCache,
    ) -> Result<(), PersistError> {
        std::fs::create_dir_all(&self.root).map_err(|e| PersistError::Write(self.root.clone(), e))?;
        let path = self.index_path();
        let tmp = tmp_path(&path);
        index.save(&tmp).map_err(PersistError::Index)?;
        rename(&tmp, &path)?;
        write_json(&self.data_path(), &pages)?;
        write_json(&self.metadata_path(), &chunks)?;
        write_json(&self.cache_path(), cache)
    }

    /// Only the page file; used when a page is stored without new chunks.
    pub fn save_pages(&self, pages: &[MemoryRecord]) -> Result<(), PersistError> {
        std::fs::create_dir_all(&self.root).map_err(|e| PersistError::Write(self.root.clone(), e))?;
        write_json(&self.data_path(), &pages)
    }

    /// Size of `index.bin` on disk, 0 if it does not exist.
    pub fn index_size_bytes(&self) -> u64 {
        std::fs::metadata(self.index_path()).map(|m| m.len()).unwrap_or(0)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn rename(from: &Path, to: &Path) -> Result<(), PersistError> {
    std::fs::rename(from, to).map_err(|e| PersistError::Write(to.to_path_buf(), e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    let s = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PersistError::Read(path.to_path_buf(), e)),
    };
    serde_json::from_str(&s)
        .map(Some)
        .map_err(|e| PersistError::Parse(path.to_path_buf(), e))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistError> {
    let s = serde_json::to_string_pretty(value).map_err(|e| PersistError::Serialize(path.to_path_buf(), e))?;
    let tmp = tmp_path(path);
    std::fs::write(&tmp, s).map_err(|e| PersistError::Write(tmp.clone(), e))?;
    rename(&tmp, path)
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("read error for {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("write error for {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("invalid JSON in {0}: {1}")]
    Parse(PathBuf, serde_json::Error),
    #[error("failed to serialize {0}: {1}")]
    Serialize(PathBuf, serde_json::Error),
    #[error("index file: {0}")]
    Index(IndexError),
}

//! Splits page text into overlapping word windows for embedding and search.
//! Each chunk is `size` words; consecutive chunks share `overlap` words.

/// Default words per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Default words shared between consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 40;

/// Window configuration. Construct with [`Chunker::new`] so the step is known to be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl Chunker {
    /// Fails when `size <= overlap`: the window would never advance.
    pub fn new(size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if size <= overlap {
            return Err(ChunkError::NonPositiveStep { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn step(&self) -> usize {
        self.size - self.overlap
    }

    /// Lazily yields chunks of `text`. The iterator is `Clone`, so a copy taken
    /// before iteration restarts from the first chunk.
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            words: text.split_whitespace().collect(),
            size: self.size,
            step: self.step(),
            pos: 0,
        }
    }
}

/// Iterator over word-window chunks, each joined by single spaces.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    words: Vec<&'a str>,
    size: usize,
    step: usize,
    pos: usize,
}

impl Iterator for Chunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.pos >= self.words.len() {
            return None;
        }
        let end = (self.pos + self.size).min(self.words.len());
        let chunk = self.words[self.pos..end].join(" ");
        self.pos += self.step;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.words.len().saturating_sub(self.pos);
        let n = remaining.div_ceil(self.step);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

/// Chunk `text` with explicit window settings.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>, ChunkError> {
    Ok(Chunker::new(size, overlap)?.chunks(text).collect())
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk size {size} must be greater than overlap {overlap}")]
    NonPositiveStep { size: usize, overlap: usize },
}

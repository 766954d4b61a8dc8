//! Record stores. [`PageStore`] holds one record per source URL;
//! [`ChunkIndex`] holds chunk records and their vectors in lock-step, so that
//! record `i` always describes vector `i`.

use std::collections::BTreeSet;

use crate::error::MemoryError;
use crate::types::{ChunkRecord, MemoryRecord};
use crate::vector::{IndexError, VectorIndex};

/// What [`PageStore::append`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAppend {
    Appended,
    /// URL already present; existing record kept (first content wins).
    Duplicate,
    /// URL already present with a blank title or content, now filled in.
    Backfilled,
    /// Empty content; nothing stored.
    Rejected,
}

/// Page-level records in insertion order, unique by URL.
#[derive(Debug, Default, Clone)]
pub struct PageStore {
    pages: Vec<MemoryRecord>,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(pages: Vec<MemoryRecord>) -> Self {
        Self { pages }
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.pages.iter().any(|p| p.url == url)
    }

    /// True when the record should be skipped because its URL is already stored.
    pub fn is_duplicate(&self, record: &MemoryRecord) -> bool {
        self.contains_url(&record.url)
    }

    pub fn append(&mut self, record: MemoryRecord) -> PageAppend {
        if !record.has_content() {
            return PageAppend::Rejected;
        }
        let Some(i) = self.pages.iter().position(|p| p.url == record.url) else {
            self.pages.push(record);
            return PageAppend::Appended;
        };
        let existing = &mut self.pages[i];
        let mut filled = false;
        if existing.title.trim().is_empty() && !record.title.trim().is_empty() {
            existing.title = record.title;
            filled = true;
        }
        if !existing.has_content() {
            existing.content = record.content;
            filled = true;
        }
        if filled {
            PageAppend::Backfilled
        } else {
            PageAppend::Duplicate
        }
    }

    pub fn get(&self, url: &str) -> Option<&MemoryRecord> {
        self.pages.iter().find(|p| p.url == url)
    }

    pub fn records(&self) -> &[MemoryRecord] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Result of [`ChunkIndex::repair`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Repair {
    pub vectors_dropped: usize,
    pub records_dropped: Vec<ChunkRecord>,
}

impl Repair {
    pub fn is_noop(&self) -> bool {
        self.vectors_dropped == 0 && self.records_dropped.is_empty()
    }

    /// URLs that lost chunk records, each once.
    pub fn affected_urls(&self) -> BTreeSet<&str> {
        self.records_dropped.iter().map(|r| r.url.as_str()).collect()
    }
}

/// Chunk records and their vectors, mutated only through [`ChunkIndex::insert`]
/// and [`ChunkIndex::insert_batch`], which update both sides together.
#[derive(Debug, Default, Clone)]
pub struct ChunkIndex {
    vectors: VectorIndex,
    records: Vec<ChunkRecord>,
}

impl ChunkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassembles a persisted pair. Drift is allowed here so a damaged snapshot
    /// can still be searched; inserts refuse until it is repaired.
    pub fn from_parts(vectors: VectorIndex, records: Vec<ChunkRecord>) -> Self {
        Self { vectors, records }
    }

    pub fn is_aligned(&self) -> bool {
        self.vectors.len() == self.records.len()
    }

    fn ensure_aligned(&self) -> Result<(), MemoryError> {
        if self.is_aligned() {
            return Ok(());
        }
        Err(MemoryError::IndexCorrupt(format!(
            "vector index has {} points but store has {} records",
            self.vectors.len(),
            self.records.len()
        )))
    }

    fn check_entry(&self, record: &ChunkRecord, vector: &[f32]) -> Result<(), MemoryError> {
        if record.chunk.trim().is_empty() {
            return Err(MemoryError::ContentUnindexable(format!(
                "empty chunk {}",
                record.chunk_id
            )));
        }
        self.vectors.check(vector)?;
        Ok(())
    }

    /// Inserts one record and its vector at the next position.
    pub fn insert(&mut self, record: ChunkRecord, vector: &[f32]) -> Result<usize, MemoryError> {
        self.ensure_aligned()?;
        self.check_entry(&record, vector)?;
        let position = self.vectors.insert(vector)?;
        self.records.push(record);
        Ok(position)
    }

    /// Inserts all entries or none. Every vector must share one dimension.
    pub fn insert_batch(
        &mut self,
        entries: Vec<(ChunkRecord, Vec<f32>)>,
    ) -> Result<Vec<usize>, MemoryError> {
        self.ensure_aligned()?;
        let mut dim = self.vectors.dimension();
        for (record, vector) in &entries {
            self.check_entry(record, vector)?;
            match dim {
                Some(d) if d != vector.len() => {
                    return Err(IndexError::DimensionMismatch {
                        expected: d,
                        got: vector.len(),
                    }
                    .into());
                }
                _ => dim = Some(vector.len()),
            }
        }
        let mut positions = Vec::with_capacity(entries.len());
        for (record, vector) in entries {
            positions.push(self.insert(record, &vector)?);
        }
        Ok(positions)
    }

    /// Trims whichever side is longer so positions line up again. Returns what
    /// was dropped; callers must forget the dedup hashes of the dropped URLs.
    pub fn repair(&mut self) -> Repair {
        let keep = self.vectors.len().min(self.records.len());
        let vectors_dropped = self.vectors.len() - keep;
        self.vectors.truncate(keep);
        let records_dropped = self.records.split_off(keep);
        Repair {
            vectors_dropped,
            records_dropped,
        }
    }

    /// Nearest neighbours as `(position, squared distance)`, closest first.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, MemoryError> {
        Ok(self.vectors.search(query, k)?)
    }

    pub fn record(&self, position: usize) -> Option<&ChunkRecord> {
        self.records.get(position)
    }

    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty() || self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, title: &str, content: &str) -> MemoryRecord {
        MemoryRecord::new(url, title, content)
    }

    fn chunk(url: &str, i: usize, text: &str) -> ChunkRecord {
        ChunkRecord::from_page(&page(url, "T", text), i, text.to_string())
    }

    #[test]
    fn first_content_wins_per_url() {
        let mut store = PageStore::new();
        assert_eq!(store.append(page("http://a", "A", "first")), PageAppend::Appended);
        assert_eq!(store.append(page("http://a", "A", "second")), PageAppend::Duplicate);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("http://a").unwrap().content, "first");
        assert!(store.is_duplicate(&page("http://a", "", "x")));
    }

    #[test]
    fn empty_content_is_rejected() {
        let mut store = PageStore::new();
        assert_eq!(store.append(page("http://a", "A", "  ")), PageAppend::Rejected);
        assert!(store.is_empty());
    }

    #[test]
    fn blank_title_is_backfilled() {
        let mut store = PageStore::new();
        store.append(page("http://a", "", "body"));
        assert_eq!(store.append(page("http://a", "Title", "other")), PageAppend::Backfilled);
        let p = store.get("http://a").unwrap();
        assert_eq!(p.title, "Title");
        assert_eq!(p.content, "body");
    }

    #[test]
    fn insert_keeps_positions_aligned() {
        let mut idx = ChunkIndex::new();
        for i in 0..5 {
            let pos = idx.insert(chunk("http://a", i, "text"), &[i as f32, 1.0]).unwrap();
            assert_eq!(pos, i);
            assert_eq!(idx.len(), idx.record_count());
        }
        assert_eq!(idx.record(3).unwrap().chunk_id, "http://a_3");
    }

    #[test]
    fn wrong_dimension_is_corruption_and_mutates_nothing() {
        let mut idx = ChunkIndex::new();
        idx.insert(chunk("http://a", 0, "x"), &[1.0, 2.0]).unwrap();
        let err = idx.insert(chunk("http://a", 1, "y"), &[1.0]).unwrap_err();
        assert!(matches!(err, MemoryError::IndexCorrupt(_)));
        assert_eq!((idx.len(), idx.record_count()), (1, 1));
    }

    #[test]
    fn empty_chunk_is_unindexable() {
        let mut idx = ChunkIndex::new();
        let err = idx.insert(chunk("http://a", 0, " "), &[1.0]).unwrap_err();
        assert!(err.is_skip());
        assert!(idx.is_empty());
        assert_eq!(idx.vectors().dimension(), None);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let mut idx = ChunkIndex::new();
        let bad = vec![
            (chunk("http://a", 0, "x"), vec![1.0, 2.0]),
            (chunk("http://a", 1, "y"), vec![1.0, 2.0, 3.0]),
        ];
        assert!(idx.insert_batch(bad).is_err());
        assert!(idx.is_empty());
        assert_eq!(idx.vectors().dimension(), None);

        let good = vec![
            (chunk("http://a", 0, "x"), vec![1.0, 2.0]),
            (chunk("http://a", 1, "y"), vec![3.0, 4.0]),
        ];
        assert_eq!(idx.insert_batch(good).unwrap(), vec![0, 1]);
        assert_eq!((idx.len(), idx.record_count()), (2, 2));
    }

    #[test]
    fn repair_trims_the_longer_side() {
        let mut vectors = VectorIndex::new();
        vectors.insert(&[1.0]).unwrap();
        let records = vec![chunk("http://a", 0, "x"), chunk("http://b", 0, "y"), chunk("http://b", 1, "z")];
        let mut idx = ChunkIndex::from_parts(vectors, records);
        let repair = idx.repair();
        assert_eq!(repair.vectors_dropped, 0);
        assert_eq!(repair.records_dropped.len(), 2);
        assert_eq!(repair.affected_urls().into_iter().collect::<Vec<_>>(), vec!["http://b"]);
        assert!(idx.is_aligned());
        idx.insert(chunk("http://c", 0, "w"), &[2.0]).unwrap();
        assert_eq!((idx.len(), idx.record_count()), (2, 2));

        let mut vectors = VectorIndex::new();
        vectors.insert(&[1.0]).unwrap();
        vectors.insert(&[2.0]).unwrap();
        let mut idx = ChunkIndex::from_parts(vectors, vec![chunk("http://a", 0, "x")]);
        let repair = idx.repair();
        assert_eq!(repair.vectors_dropped, 1);
        assert!(repair.records_dropped.is_empty());
        assert_eq!((idx.len(), idx.record_count()), (1, 1));
        assert!(idx.repair().is_noop());
    }

    #[test]
    fn drifted_parts_refuse_inserts() {
        let mut vectors = VectorIndex::new();
        vectors.insert(&[1.0]).unwrap();
        vectors.insert(&[2.0]).unwrap();
        let mut idx = ChunkIndex::from_parts(vectors, vec![chunk("http://a", 0, "x")]);
        assert!(!idx.is_aligned());
        let err = idx.insert(chunk("http://a", 1, "y"), &[3.0]).unwrap_err();
        assert!(matches!(err, MemoryError::IndexCorrupt(_)));
    }
}

//! Exact nearest-neighbour index over fixed-dimension f32 vectors.
//!
//! Points are addressed only by insertion position (0, 1, 2, …); there is no
//! removal or compaction, so a position stays valid for the life of the index.
//! Distance is squared L2 with no normalization: callers that want cosine
//! similarity must normalize before insert and search.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 4] = b"MNIX";
const FORMAT_VERSION: u32 = 1;

/// Flat (brute-force) L2 index. The dimension is fixed by the first insert.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VectorIndex {
    dim: Option<usize>,
    /// Row-major: point `i` is `data[i * dim..(i + 1) * dim]`.
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dimension established by the first insert, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.dim
    }

    pub fn len(&self) -> usize {
        match self.dim {
            Some(d) => self.data.len() / d,
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fails without mutating the index when `vector` would break the dimension invariant.
    pub fn check(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.is_empty() {
            return Err(IndexError::EmptyVector);
        }
        match self.dim {
            Some(d) if d != vector.len() => Err(IndexError::DimensionMismatch {
                expected: d,
                got: vector.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Appends `vector` and returns its position.
    pub fn insert(&mut self, vector: &[f32]) -> Result<usize, IndexError> {
        self.check(vector)?;
        let position = self.len();
        self.dim.get_or_insert(vector.len());
        self.data.extend_from_slice(vector);
        Ok(position)
    }

    /// Keeps only the first `len` points. Dropping every point resets the dimension.
    pub fn truncate(&mut self, len: usize) {
        let Some(dim) = self.dim else {
            return;
        };
        self.data.truncate(len.saturating_mul(dim));
        if self.data.is_empty() {
            self.dim = None;
        }
    }

    /// Up to `k` nearest points as `(position, squared distance)`, closest first.
    /// Equal distances keep the earlier position first. Empty index gives an empty list.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, IndexError> {
        let Some(dim) = self.dim else {
            return Ok(Vec::new());
        };
        if k == 0 || self.data.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != dim {
            return Err(IndexError::DimensionMismatch {
                expected: dim,
                got: query.len(),
            });
        }
        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(dim)
            .enumerate()
            .map(|(pos, point)| (pos, squared_l2(query, point)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    /// Size in bytes of the serialized form.
    pub fn encoded_len(&self) -> usize {
        4 + 4 + 4 + 8 + self.data.len() * 4
    }

    /// Writes the whole index to `path`.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let file = File::create(path).map_err(IndexError::Io)?;
        let mut w = BufWriter::new(file);
        self.write_to(&mut w)?;
        w.flush().map_err(IndexError::Io)
    }

    pub fn write_to(&self, w: &mut impl Write) -> Result<(), IndexError> {
        let dim = self.dim.unwrap_or(0) as u32;
        w.write_all(MAGIC).map_err(IndexError::Io)?;
        w.write_all(&FORMAT_VERSION.to_le_bytes()).map_err(IndexError::Io)?;
        w.write_all(&dim.to_le_bytes()).map_err(IndexError::Io)?;
        w.write_all(&(self.len() as u64).to_le_bytes()).map_err(IndexError::Io)?;
        for f in &self.data {
            w.write_all(&f.to_le_bytes()).map_err(IndexError::Io)?;
        }
        Ok(())
    }

    /// Reads an index from `path`. A missing file is an empty, uninitialised index.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(IndexError::Io(e)),
        };
        Self::read_from(&mut BufReader::new(file))
    }

    pub fn read_from(r: &mut impl Read) -> Result<Self, IndexError> {
        let mut magic = [0u8; 4];
        read_exact(r, &mut magic)?;
        if &magic != MAGIC {
            return Err(IndexError::Format("bad magic".into()));
        }
        let version = read_u32(r)?;
        if version != FORMAT_VERSION {
            return Err(IndexError::Format(format!("unsupported version {version}")));
        }
        let dim = read_u32(r)? as usize;
        let count = read_u64(r)? as usize;
        if dim == 0 {
            if count != 0 {
                return Err(IndexError::Format(format!("{count} points with dimension 0")));
            }
            return Ok(Self::new());
        }
        let total = count
            .checked_mul(dim)
            .ok_or_else(|| IndexError::Format("point count overflows".into()))?;
        let mut bytes = Vec::new();
        r.read_to_end(&mut bytes).map_err(IndexError::Io)?;
        if bytes.len() != total * 4 {
            return Err(IndexError::Format(format!(
                "expected {} bytes of vector data, found {}",
                total * 4,
                bytes.len()
            )));
        }
        let data = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self {
            dim: if count == 0 { None } else { Some(dim) },
            data,
        })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn read_exact(r: &mut impl Read, buf: &mut [u8]) -> Result<(), IndexError> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => IndexError::Format("truncated header".into()),
        _ => IndexError::Io(e),
    })
}

fn read_u32(r: &mut impl Read) -> Result<u32, IndexError> {
    let mut b = [0u8; 4];
    read_exact(r, &mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_u64(r: &mut impl Read) -> Result<u64, IndexError> {
    let mut b = [0u8; 8];
    read_exact(r, &mut b)?;
    Ok(u64::from_le_bytes(b))
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("vector dimension {got} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("cannot index an empty vector")]
    EmptyVector,
    #[error("index file is malformed: {0}")]
    Format(String),
    #[error("index I/O failed: {0}")]
    Io(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index_searches_to_nothing() {
        let idx = VectorIndex::new();
        assert_eq!(idx.dimension(), None);
        assert!(idx.search(&[1.0, 2.0], 5).unwrap().is_empty());
    }

    #[test]
    fn insert_assigns_sequential_positions() {
        let mut idx = VectorIndex::new();
        assert_eq!(idx.insert(&[0.0, 0.0]).unwrap(), 0);
        assert_eq!(idx.insert(&[1.0, 0.0]).unwrap(), 1);
        assert_eq!(idx.insert(&[0.0, 1.0]).unwrap(), 2);
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.dimension(), Some(2));
    }

    #[test]
    fn dimension_mismatch_leaves_index_untouched() {
        let mut idx = VectorIndex::new();
        idx.insert(&[1.0, 2.0, 3.0]).unwrap();
        let before = idx.clone();
        let err = idx.insert(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, got: 2 }));
        assert_eq!(idx, before);
        assert!(matches!(idx.insert(&[]), Err(IndexError::EmptyVector)));
        assert_eq!(idx, before);
    }

    #[test]
    fn search_orders_by_squared_distance_then_position() {
        let mut idx = VectorIndex::new();
        idx.insert(&[3.0, 0.0]).unwrap();
        idx.insert(&[1.0, 0.0]).unwrap();
        idx.insert(&[0.0, 1.0]).unwrap();
        idx.insert(&[1.0, 0.0]).unwrap();
        let hits = idx.search(&[0.0, 0.0], 10).unwrap();
        assert_eq!(hits, vec![(1, 1.0), (2, 1.0), (3, 1.0), (0, 9.0)]);
        let top2 = idx.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(top2, vec![(1, 0.0), (3, 0.0)]);
    }

    #[test]
    fn vectors_are_not_normalized() {
        let mut idx = VectorIndex::new();
        idx.insert(&[10.0, 0.0]).unwrap();
        idx.insert(&[1.0, 0.0]).unwrap();
        let hits = idx.search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(hits, vec![(1, 0.0)]);
    }

    #[test]
    fn truncate_drops_trailing_points() {
        let mut idx = VectorIndex::new();
        idx.insert(&[1.0, 1.0]).unwrap();
        idx.insert(&[2.0, 2.0]).unwrap();
        idx.insert(&[3.0, 3.0]).unwrap();
        idx.truncate(5);
        assert_eq!(idx.len(), 3);
        idx.truncate(1);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.search(&[2.0, 2.0], 5).unwrap(), vec![(0, 2.0)]);
        idx.truncate(0);
        assert_eq!(idx.dimension(), None);
        idx.insert(&[1.0]).unwrap();
    }

    #[test]
    fn search_rejects_wrong_query_dimension() {
        let mut idx = VectorIndex::new();
        idx.insert(&[1.0, 2.0]).unwrap();
        assert!(idx.search(&[1.0], 1).is_err());
    }

    #[test]
    fn save_and_load_restore_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        let mut idx = VectorIndex::new();
        idx.insert(&[0.5, -1.25, 3.0]).unwrap();
        idx.insert(&[7.0, 8.0, 9.0]).unwrap();
        idx.save(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, idx.encoded_len());
        let back = VectorIndex::load(&path).unwrap();
        assert_eq!(back, idx);
        assert_eq!(back.dimension(), Some(3));
    }

    #[test]
    fn load_missing_file_is_uninitialised() {
        let dir = tempfile::tempdir().unwrap();
        let idx = VectorIndex::load(&dir.path().join("nope.bin")).unwrap();
        assert!(idx.is_empty());
        assert_eq!(idx.dimension(), None);
    }

    #[test]
    fn empty_index_round_trips_uninitialised() {
        let mut buf = Vec::new();
        VectorIndex::new().write_to(&mut buf).unwrap();
        let back = VectorIndex::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(back.dimension(), None);
    }

    #[test]
    fn truncated_file_is_a_format_error() {
        let mut idx = VectorIndex::new();
        idx.insert(&[1.0, 2.0]).unwrap();
        let mut buf = Vec::new();
        idx.write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 2);
        assert!(matches!(
            VectorIndex::read_from(&mut buf.as_slice()),
            Err(IndexError::Format(_))
        ));
        assert!(matches!(
            VectorIndex::read_from(&mut &b"XXXX"[..]),
            Err(IndexError::Format(_))
        ));
    }
}

use rayon::prelude::*;

use crate::error::{Error, Result};

/// Header size: 4 bytes vector count + 4 bytes dimension.
const HEADER_SIZE: usize = 8;

/// Exact inner-product index over unit-normalized vectors.
///
/// Append-only flat storage: entry `i` occupies
/// `data[i * dimension..(i + 1) * dimension]`. Because callers provide
/// pre-normalized vectors, inner product equals cosine similarity; the index
/// never re-normalizes, so an upstream normalization bug surfaces here
/// instead of being hidden.
///
/// Per-patient collections are small, so search is a brute-force scan. There
/// is no deletion and no re-indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index. The dimension is fixed for the index lifetime
    /// and comes from the embedding provider.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn count(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append vectors in caller order. Every vector must match the index
    /// dimension; nothing is appended if any does not.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for vector in vectors {
            if vector.len() != self.dimension {
                return Err(Error::InvalidInput(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    vector.len()
                )));
            }
        }
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// K-nearest-neighbor search by inner product.
    ///
    /// Returns at most `k` `(position, score)` pairs ordered by descending
    /// score; `k` is clamped to the current size. Searching an empty index
    /// returns an empty vector, not an error.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(Error::InvalidInput(format!(
                "query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .par_chunks(self.dimension)
            .enumerate()
            .map(|(position, row)| (position, dot(row, query)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k.min(self.count()));
        Ok(scored)
    }

    /// Encode as a binary blob.
    ///
    /// Layout: count (u32 LE), dimension (u32 LE), then `count * dimension`
    /// f32 LE values in row-major order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.data.len() * 4);
        out.extend_from_slice(&(self.count() as u32).to_le_bytes());
        out.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        out.extend_from_slice(bytemuck::cast_slice(&self.data));
        out
    }

    /// Decode a blob produced by [`to_bytes`](Self::to_bytes). Returns `None`
    /// when the header or payload length is malformed.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }

        let count = u32::from_le_bytes(bytes[0..4].try_into().ok()?) as usize;
        let dimension =
            u32::from_le_bytes(bytes[4..8].try_into().ok()?) as usize;

        let expected_len = HEADER_SIZE + count * dimension * 4;
        if bytes.len() != expected_len {
            return None;
        }

        // pod_collect_to_vec tolerates the unaligned byte payload.
        let data: Vec<f32> =
            bytemuck::pod_collect_to_vec(&bytes[HEADER_SIZE..]);

        Some(Self { dimension, data })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

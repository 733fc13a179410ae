//! Exact (brute-force) L2 index.
//!
//! Scans every stored vector for each query. Used for small corpora where
//! training regions would cost more than it saves.

use crate::error::VecdexResult;
use crate::vector::clustering::squared_l2;
use crate::vector::storage::VectorStorage;
use crate::vector::types::{Neighbor, OrdinalRange, VectorDimension};
use rayon::prelude::*;

/// Above this many vectors the scan is split across the rayon pool.
const PARALLEL_SCAN_THRESHOLD: usize = 4096;

/// Flat index over all stored vectors.
#[derive(Debug, Clone)]
pub struct ExactIndex {
    storage: VectorStorage,
}

impl ExactIndex {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            storage: VectorStorage::new(dimension),
        }
    }

    /// Builds an index holding `vectors` at ordinals `0..n`.
    pub fn build(dimension: VectorDimension, vectors: &[Vec<f32>]) -> VecdexResult<Self> {
        let mut index = Self::new(dimension);
        index.add(vectors)?;
        Ok(index)
    }

    pub(crate) fn from_storage(storage: VectorStorage) -> Self {
        Self { storage }
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.storage.dimension()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn add(&mut self, vectors: &[Vec<f32>]) -> VecdexResult<OrdinalRange> {
        self.storage.append_batch(vectors)
    }

    /// Returns the `min(k, len)` nearest vectors by ascending distance.
    pub fn search(&self, query: &[f32], k: usize) -> VecdexResult<Vec<Neighbor>> {
        self.dimension().validate_vector("search", query)?;

        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let score = |(ordinal, vector): (_, &[f32])| Neighbor {
            ordinal,
            distance: squared_l2(query, vector),
        };

        let mut hits: Vec<Neighbor> = if self.len() >= PARALLEL_SCAN_THRESHOLD {
            let collected: Vec<_> = self.storage.iter().collect();
            collected.into_par_iter().map(score).collect()
        } else {
            self.storage.iter().map(score).collect()
        };

        hits.sort_by(Neighbor::rank);
        hits.truncate(k);
        Ok(hits)
    }

    pub(crate) fn storage(&self) -> &VectorStorage {
        &self.storage
    }
}

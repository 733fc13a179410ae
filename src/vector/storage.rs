//! Contiguous in-memory vector storage.
//!
//! Vectors are kept in one flat `Vec<f32>` in insertion order, so the
//! vector with ordinal `i` occupies `data[i * dim..(i + 1) * dim]`. This is
//! the layout both index flavors scan and the layout persisted to disk.

use crate::error::{VecdexError, VecdexResult};
use crate::vector::types::{Ordinal, OrdinalRange, VectorDimension};

/// Append-only store of fixed-dimension vectors.
#[derive(Debug, Clone)]
pub struct VectorStorage {
    dimension: VectorDimension,
    data: Vec<f32>,
}

impl VectorStorage {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Rebuilds storage from a flat buffer read back from disk.
    pub fn from_raw(dimension: VectorDimension, data: Vec<f32>) -> VecdexResult<Self> {
        if data.len() % dimension.get() != 0 {
            return Err(VecdexError::CorruptIndex {
                reason: format!(
                    "vector buffer of {} floats is not a multiple of dimension {}",
                    data.len(),
                    dimension
                ),
            });
        }
        Ok(Self { dimension, data })
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension.get()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends a batch, assigning consecutive ordinals from the current count.
    ///
    /// The whole batch is validated first; on error nothing is stored.
    pub fn append_batch(&mut self, vectors: &[Vec<f32>]) -> VecdexResult<OrdinalRange> {
        self.dimension.validate_batch("add", vectors)?;
        let range = OrdinalRange::starting_at(self.len(), vectors.len())?;

        self.data.reserve(vectors.len() * self.dimension.get());
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(range)
    }

    #[must_use]
    pub fn get(&self, ordinal: Ordinal) -> Option<&[f32]> {
        let dim = self.dimension.get();
        let start = ordinal.as_index().checked_mul(dim)?;
        self.data.get(start..start + dim)
    }

    /// Iterates `(ordinal, vector)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Ordinal, &[f32])> + '_ {
        self.data
            .chunks_exact(self.dimension.get())
            .enumerate()
            .map(|(i, v)| (Ordinal::new(i as u32), v))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim(n: usize) -> VectorDimension {
        VectorDimension::new(n).unwrap()
    }

    #[test]
    fn test_append_assigns_consecutive_ordinals() {
        let mut storage = VectorStorage::new(dim(2));
        let first = storage
            .append_batch(&[vec![1.0, 0.0], vec![0.0, 1.0]])
            .unwrap();
        assert_eq!(first.start.get(), 0);
        assert_eq!(first.len(), 2);

        let second = storage.append_batch(&[vec![5.0, 5.0]]).unwrap();
        assert_eq!(second.start.get(), 2);
        assert_eq!(storage.len(), 3);
        assert_eq!(storage.get(Ordinal::new(2)), Some(&[5.0, 5.0][..]));
        assert_eq!(storage.get(Ordinal::new(3)), None);
    }

    #[test]
    fn test_bad_batch_is_rejected_whole() {
        let mut storage = VectorStorage::new(dim(2));
        let result = storage.append_batch(&[vec![1.0, 0.0], vec![1.0, 2.0, 3.0]]);
        assert!(result.is_err());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_from_raw_checks_shape() {
        assert!(VectorStorage::from_raw(dim(3), vec![0.0; 7]).is_err());
        let storage = VectorStorage::from_raw(dim(3), vec![0.0; 9]).unwrap();
        assert_eq!(storage.len(), 3);
        assert_eq!(storage.iter().count(), 3);
    }
}

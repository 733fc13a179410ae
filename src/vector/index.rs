//! The `VectorIndex` tagged variant over both index flavors.

use crate::error::VecdexResult;
use crate::vector::clustering::KMeansOptions;
use crate::vector::flat::ExactIndex;
use crate::vector::ivf::IvfIndex;
use crate::vector::sizing::IndexPlan;
use crate::vector::types::{IndexFlavor, Neighbor, OrdinalRange, VectorDimension};

/// Capability shared by every index flavor.
pub trait NearestNeighbors: Send + Sync {
    fn dimension(&self) -> VectorDimension;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether vectors can be added. Always true for the exact index.
    fn is_trained(&self) -> bool;

    /// Appends vectors at ordinals `[len, len + n)`.
    fn add(&mut self, vectors: &[Vec<f32>]) -> VecdexResult<OrdinalRange>;

    /// Up to `k` nearest stored vectors, ascending by distance.
    fn search(&self, query: &[f32], k: usize) -> VecdexResult<Vec<Neighbor>>;
}

impl NearestNeighbors for ExactIndex {
    fn dimension(&self) -> VectorDimension {
        ExactIndex::dimension(self)
    }

    fn len(&self) -> usize {
        ExactIndex::len(self)
    }

    fn is_trained(&self) -> bool {
        true
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> VecdexResult<OrdinalRange> {
        ExactIndex::add(self, vectors)
    }

    fn search(&self, query: &[f32], k: usize) -> VecdexResult<Vec<Neighbor>> {
        ExactIndex::search(self, query, k)
    }
}

impl NearestNeighbors for IvfIndex {
    fn dimension(&self) -> VectorDimension {
        IvfIndex::dimension(self)
    }

    fn len(&self) -> usize {
        IvfIndex::len(self)
    }

    fn is_trained(&self) -> bool {
        IvfIndex::is_trained(self)
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> VecdexResult<OrdinalRange> {
        IvfIndex::add(self, vectors)
    }

    fn search(&self, query: &[f32], k: usize) -> VecdexResult<Vec<Neighbor>> {
        IvfIndex::search(self, query, k)
    }
}

/// An index of either flavor, chosen at construction.
#[derive(Debug, Clone)]
pub enum VectorIndex {
    Exact(ExactIndex),
    Approximate(IvfIndex),
}

impl VectorIndex {
    /// Creates an empty index following a sizing plan.
    pub fn from_plan(
        dimension: VectorDimension,
        plan: IndexPlan,
        kmeans: KMeansOptions,
    ) -> VecdexResult<Self> {
        Ok(match plan {
            IndexPlan::Exact => Self::Exact(ExactIndex::new(dimension)),
            IndexPlan::Approximate { regions, probes } => {
                Self::Approximate(IvfIndex::new(dimension, regions, probes, kmeans)?)
            }
        })
    }

    #[must_use]
    pub fn flavor(&self) -> IndexFlavor {
        match self {
            Self::Exact(_) => IndexFlavor::Exact,
            Self::Approximate(_) => IndexFlavor::Approximate,
        }
    }

    /// Trains an approximate index; a no-op for the exact index or once trained.
    pub fn train(&mut self, samples: &[Vec<f32>]) -> VecdexResult<()> {
        match self {
            Self::Exact(index) => index.dimension().validate_batch("train", samples),
            Self::Approximate(index) => index.train(samples),
        }
    }

    #[must_use]
    pub fn regions(&self) -> Option<usize> {
        match self {
            Self::Exact(_) => None,
            Self::Approximate(index) => Some(index.regions()),
        }
    }

    #[must_use]
    pub fn probes(&self) -> Option<usize> {
        match self {
            Self::Exact(_) => None,
            Self::Approximate(index) => Some(index.probes()),
        }
    }

    /// Re-configures probes on an approximate index. Ignored for exact.
    pub fn set_probes(&mut self, probes: usize) -> VecdexResult<()> {
        match self {
            Self::Exact(_) => Ok(()),
            Self::Approximate(index) => index.set_probes(probes),
        }
    }

    fn inner(&self) -> &dyn NearestNeighbors {
        match self {
            Self::Exact(index) => index,
            Self::Approximate(index) => index,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn NearestNeighbors {
        match self {
            Self::Exact(index) => index,
            Self::Approximate(index) => index,
        }
    }
}

impl NearestNeighbors for VectorIndex {
    fn dimension(&self) -> VectorDimension {
        self.inner().dimension()
    }

    fn len(&self) -> usize {
        self.inner().len()
    }

    fn is_trained(&self) -> bool {
        self.inner().is_trained()
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> VecdexResult<OrdinalRange> {
        self.inner_mut().add(vectors)
    }

    fn search(&self, query: &[f32], k: usize) -> VecdexResult<Vec<Neighbor>> {
        self.inner().search(query, k)
    }
}

//! Inverted-file (IVF-Flat) approximate index.
//!
//! Training clusters a representative batch into `regions` centroids. Every
//! vector added afterwards lands in the bucket of its nearest centroid, and a
//! query scans only the buckets of its `probes` nearest centroids with exact
//! L2 inside them.
//!
//! # Recall contract
//!
//! Results are approximate: a true nearest neighbour stored in an unprobed
//! region is missed. With `probes == regions` every bucket is scanned and the
//! results equal those of the exact index.

use crate::error::{VecdexError, VecdexResult};
use crate::vector::clustering::{
    ClusteringError, KMeansOptions, assign_to_nearest_centroid, kmeans_clustering,
    nearest_centroids, squared_l2,
};
use crate::vector::storage::VectorStorage;
use crate::vector::types::{Neighbor, Ordinal, OrdinalRange, RegionId, VectorDimension};

/// Approximate index over k-means regions.
#[derive(Debug, Clone)]
pub struct IvfIndex {
    dimension: VectorDimension,
    regions: usize,
    probes: usize,
    kmeans: KMeansOptions,
    /// One centroid per region, empty until trained.
    centroids: Vec<Vec<f32>>,
    /// Ordinals per region, ascending.
    buckets: Vec<Vec<Ordinal>>,
    /// Region of every stored vector, indexed by ordinal.
    assignments: Vec<RegionId>,
    storage: VectorStorage,
    trained: bool,
}

impl IvfIndex {
    /// Creates an empty, untrained index.
    ///
    /// `regions` is fixed for the lifetime of the index; `probes` must lie
    /// in `1..=regions` and can be changed later with [`IvfIndex::set_probes`].
    pub fn new(
        dimension: VectorDimension,
        regions: usize,
        probes: usize,
        kmeans: KMeansOptions,
    ) -> VecdexResult<Self> {
        if regions == 0 {
            return Err(VecdexError::InvalidParameter {
                name: "regions",
                value: regions.to_string(),
                reason: "an approximate index needs at least one region",
            });
        }
        validate_probes(probes, regions)?;

        Ok(Self {
            dimension,
            regions,
            probes,
            kmeans,
            centroids: Vec::new(),
            buckets: Vec::new(),
            assignments: Vec::new(),
            storage: VectorStorage::new(dimension),
            trained: false,
        })
    }

    /// Reassembles a trained index from persisted parts.
    pub(crate) fn from_parts(
        regions: usize,
        probes: usize,
        kmeans: KMeansOptions,
        centroids: Vec<Vec<f32>>,
        assignments: Vec<RegionId>,
        storage: VectorStorage,
    ) -> VecdexResult<Self> {
        let dimension = storage.dimension();
        let mut index = Self::new(dimension, regions, probes, kmeans)?;

        if centroids.len() != regions {
            return Err(VecdexError::CorruptIndex {
                reason: format!("expected {regions} centroids, found {}", centroids.len()),
            });
        }
        if let Some(bad) = centroids.iter().find(|c| c.len() != dimension.get()) {
            return Err(VecdexError::CorruptIndex {
                reason: format!(
                    "centroid of dimension {} in a {dimension}-dimensional index",
                    bad.len()
                ),
            });
        }
        if assignments.len() != storage.len() {
            return Err(VecdexError::CorruptIndex {
                reason: format!(
                    "{} region assignments for {} vectors",
                    assignments.len(),
                    storage.len()
                ),
            });
        }

        let mut buckets = vec![Vec::new(); regions];
        for (i, region) in assignments.iter().enumerate() {
            let bucket = buckets
                .get_mut(region.as_index())
                .ok_or_else(|| VecdexError::CorruptIndex {
                    reason: format!("vector {i} assigned to unknown region {}", region.get()),
                })?;
            bucket.push(Ordinal::from_index(i)?);
        }

        index.centroids = centroids;
        index.buckets = buckets;
        index.assignments = assignments;
        index.storage = storage;
        index.trained = true;
        Ok(index)
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn regions(&self) -> usize {
        self.regions
    }

    #[must_use]
    pub fn probes(&self) -> usize {
        self.probes
    }

    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Changes how many regions a query scans.
    pub fn set_probes(&mut self, probes: usize) -> VecdexResult<()> {
        validate_probes(probes, self.regions)?;
        self.probes = probes;
        Ok(())
    }

    /// Derives the region centroids from a sample batch.
    ///
    /// A no-op once trained. Requires at least `regions` samples.
    pub fn train(&mut self, samples: &[Vec<f32>]) -> VecdexResult<()> {
        if self.trained {
            tracing::debug!(target: "vecdex::ivf", "index already trained, skipping");
            return Ok(());
        }

        self.dimension.validate_batch("train", samples)?;
        if samples.len() < self.regions {
            return Err(VecdexError::InsufficientTrainingData {
                samples: samples.len(),
                regions: self.regions,
            });
        }

        let sample_refs: Vec<&[f32]> = samples.iter().map(Vec::as_slice).collect();
        let result = kmeans_clustering(&sample_refs, self.regions, &self.kmeans).map_err(
            |e| match e {
                ClusteringError::DimensionMismatch { expected, actual } => {
                    VecdexError::DimensionMismatch {
                        operation: "train",
                        expected,
                        actual,
                    }
                }
                ClusteringError::EmptyVectorSet | ClusteringError::InvalidClusterCount { .. } => {
                    VecdexError::InsufficientTrainingData {
                        samples: samples.len(),
                        regions: self.regions,
                    }
                }
            },
        )?;

        tracing::info!(
            target: "vecdex::ivf",
            "trained {} regions on {} samples in {} iterations",
            self.regions,
            samples.len(),
            result.iterations
        );

        self.centroids = result.centroids;
        self.buckets = vec![Vec::new(); self.regions];
        self.trained = true;
        Ok(())
    }

    /// Appends vectors, routing each to its nearest region.
    ///
    /// Ordinals continue from the current count regardless of region.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> VecdexResult<OrdinalRange> {
        if !self.trained {
            return Err(VecdexError::NotTrained { operation: "add" });
        }

        let range = self.storage.append_batch(vectors)?;
        for (ordinal, vector) in range.iter().zip(vectors.iter()) {
            let region = assign_to_nearest_centroid(vector, &self.centroids);
            self.buckets[region.as_index()].push(ordinal);
            self.assignments.push(region);
        }
        Ok(range)
    }

    /// Searches the configured number of probes.
    pub fn search(&self, query: &[f32], k: usize) -> VecdexResult<Vec<Neighbor>> {
        self.search_with_probes(query, k, self.probes)
    }

    /// Searches the `probes` regions nearest to `query`.
    ///
    /// Returns at most `k` neighbours by ascending distance, ties broken by
    /// lower ordinal. Fails with `NotTrained` before training.
    pub fn search_with_probes(
        &self,
        query: &[f32],
        k: usize,
        probes: usize,
    ) -> VecdexResult<Vec<Neighbor>> {
        self.dimension.validate_vector("search", query)?;
        validate_probes(probes, self.regions)?;

        if !self.trained {
            return Err(VecdexError::NotTrained { operation: "search" });
        }
        if k == 0 || self.storage.is_empty() {
            return Ok(Vec::new());
        }

        let probed = nearest_centroids(query, &self.centroids, probes);
        tracing::debug!(
            target: "vecdex::ivf",
            "probing regions {:?}",
            probed.iter().map(RegionId::get).collect::<Vec<_>>()
        );

        let mut hits: Vec<Neighbor> = probed
            .iter()
            .flat_map(|region| self.buckets[region.as_index()].iter())
            .filter_map(|&ordinal| {
                self.storage.get(ordinal).map(|vector| Neighbor {
                    ordinal,
                    distance: squared_l2(query, vector),
                })
            })
            .collect();

        hits.sort_by(Neighbor::rank);
        hits.truncate(k);
        Ok(hits)
    }

    pub(crate) fn kmeans(&self) -> &KMeansOptions {
        &self.kmeans
    }

    pub(crate) fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    pub(crate) fn assignments(&self) -> &[RegionId] {
        &self.assignments
    }

    pub(crate) fn storage(&self) -> &VectorStorage {
        &self.storage
    }
}

fn validate_probes(probes: usize, regions: usize) -> VecdexResult<()> {
    if probes == 0 || probes > regions {
        return Err(VecdexError::InvalidParameter {
            name: "probes",
            value: probes.to_string(),
            reason: "probes must be between 1 and the region count",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::flat::ExactIndex;

    fn synthetic(n: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| {
                (0..dim)
                    .map(|j| (((i * 31 + j * 17) % 23) as f32) / 7.0 + (i % 4) as f32 * 3.0)
                    .collect()
            })
            .collect()
    }

    fn trained_index(vectors: &[Vec<f32>], regions: usize, probes: usize) -> IvfIndex {
        let dim = VectorDimension::new(vectors[0].len()).unwrap();
        let mut index = IvfIndex::new(dim, regions, probes, KMeansOptions::default()).unwrap();
        index.train(vectors).unwrap();
        index.add(vectors).unwrap();
        index
    }

    #[test]
    fn test_add_before_train_fails() {
        let dim = VectorDimension::new(2).unwrap();
        let mut index = IvfIndex::new(dim, 2, 1, KMeansOptions::default()).unwrap();
        let err = index.add(&[vec![1.0, 2.0]]).unwrap_err();
        assert_eq!(err.status_code(), "NOT_TRAINED");
        assert!(index.is_empty());
    }

    #[test]
    fn test_train_requires_enough_samples() {
        let dim = VectorDimension::new(2).unwrap();
        let mut index = IvfIndex::new(dim, 4, 1, KMeansOptions::default()).unwrap();
        let err = index.train(&synthetic(3, 2)).unwrap_err();
        assert!(matches!(
            err,
            VecdexError::InsufficientTrainingData {
                samples: 3,
                regions: 4
            }
        ));
        assert!(!index.is_trained());
    }

    #[test]
    fn test_search_before_training_is_an_error() {
        let dim = VectorDimension::new(2).unwrap();
        let index = IvfIndex::new(dim, 2, 1, KMeansOptions::default()).unwrap();
        let err = index.search(&[0.0, 0.0], 3).unwrap_err();
        assert!(matches!(err, VecdexError::NotTrained { operation: "search" }));
    }

    #[test]
    fn test_train_rejects_wrong_dimension() {
        let dim = VectorDimension::new(3).unwrap();
        let mut index = IvfIndex::new(dim, 2, 1, KMeansOptions::default()).unwrap();
        let err = index.train(&synthetic(5, 2)).unwrap_err();
        assert_eq!(err.status_code(), "DIMENSION_MISMATCH");
    }

    #[test]
    fn test_train_is_idempotent() {
        let vectors = synthetic(20, 8);
        let mut index = trained_index(&vectors, 4, 2);
        let before = index.search(&vectors[5], 5).unwrap();
        let centroids = index.centroids().to_vec();

        index.train(&synthetic(30, 8)).unwrap();

        assert_eq!(index.centroids(), centroids.as_slice());
        assert_eq!(index.search(&vectors[5], 5).unwrap(), before);
    }

    #[test]
    fn test_all_probes_match_exact_search() {
        let vectors = synthetic(20, 8);
        let dim = VectorDimension::new(8).unwrap();
        let mut index = IvfIndex::new(dim, 4, 4, KMeansOptions::default()).unwrap();
        index.train(&vectors).unwrap();
        index.add(&vectors).unwrap();
        let exact = ExactIndex::build(dim, &vectors).unwrap();

        for query in [&vectors[0], &vectors[7], &vec![1.5; 8]] {
            let approximate = index.search(query, 6).unwrap();
            let expected = exact.search(query, 6).unwrap();
            assert_eq!(approximate, expected);
        }
    }

    #[test]
    fn test_stored_vector_finds_itself() {
        let vectors = synthetic(40, 4);
        let index = trained_index(&vectors, 5, 1);
        for (i, vector) in vectors.iter().enumerate() {
            let hits = index.search(vector, 1).unwrap();
            assert_eq!(hits[0].distance, 0.0);
            // Duplicates may tie; the lowest ordinal holding this vector wins.
            let first = vectors.iter().position(|v| v == vector).unwrap();
            assert_eq!(hits[0].ordinal.as_index(), first.min(i));
        }
    }

    #[test]
    fn test_ordinals_continue_across_batches() {
        let vectors = synthetic(12, 3);
        let dim = VectorDimension::new(3).unwrap();
        let mut index = IvfIndex::new(dim, 3, 3, KMeansOptions::default()).unwrap();
        index.train(&vectors).unwrap();

        let first = index.add(&vectors[..7]).unwrap();
        let second = index.add(&vectors[7..]).unwrap();
        assert_eq!((first.start.get(), first.end.get()), (0, 7));
        assert_eq!((second.start.get(), second.end.get()), (7, 12));
        assert_eq!(index.len(), 12);
    }

    #[test]
    fn test_probe_bounds() {
        let dim = VectorDimension::new(2).unwrap();
        assert!(IvfIndex::new(dim, 4, 0, KMeansOptions::default()).is_err());
        assert!(IvfIndex::new(dim, 4, 5, KMeansOptions::default()).is_err());
        assert!(IvfIndex::new(dim, 0, 1, KMeansOptions::default()).is_err());

        let mut index = IvfIndex::new(dim, 4, 1, KMeansOptions::default()).unwrap();
        assert!(index.set_probes(4).is_ok());
        assert_eq!(index.probes(), 4);
        assert!(index.set_probes(9).is_err());
        assert_eq!(index.probes(), 4);
    }

    #[test]
    fn test_k_larger_than_corpus() {
        let vectors = synthetic(10, 2);
        let index = trained_index(&vectors, 2, 2);
        assert_eq!(index.search(&vectors[0], 50).unwrap().len(), 10);
    }
}

//! An index together with its metadata side-table.
//!
//! [`Catalog`] is the owned handle that keeps the two in lockstep: every
//! insertion assigns ordinals in the index and appends the matching records,
//! so the side-table length always equals the vector count.
//!
//! [`SharedCatalog`] is how a built catalog reaches concurrent readers. A
//! catalog is built or extended privately, then published; readers take a
//! snapshot `Arc` and never observe a half-built index. Rebuilding publishes
//! a new catalog in place of the old one.

use crate::error::{VecdexError, VecdexResult};
use crate::metadata::{MetadataRecord, MetadataTable};
use crate::persistence::{self, ArtifactPaths};
use crate::vector::{
    DEFAULT_EXACT_THRESHOLD, IndexFlavor, IndexPlan, KMeansOptions, NearestNeighbors, Neighbor,
    Ordinal, OrdinalRange, VectorDimension, VectorIndex, plan_index,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Parameters for building a fresh catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildOptions {
    /// Corpora smaller than this use the exact index.
    pub exact_threshold: usize,
    pub regions: Option<usize>,
    pub probes: Option<usize>,
    pub kmeans: KMeansOptions,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            exact_threshold: DEFAULT_EXACT_THRESHOLD,
            regions: None,
            probes: None,
            kmeans: KMeansOptions::default(),
        }
    }
}

impl BuildOptions {
    /// Sizing plan for a corpus of `corpus_size` vectors.
    #[must_use]
    pub fn plan(&self, corpus_size: usize) -> IndexPlan {
        if corpus_size == 0 {
            return IndexPlan::Exact;
        }
        plan_index(corpus_size, self.exact_threshold).with_overrides(
            corpus_size,
            self.regions,
            self.probes,
        )
    }
}

/// Summary of a catalog's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub flavor: IndexFlavor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probes: Option<usize>,
    pub vector_count: usize,
    pub dimension: usize,
    pub trained: bool,
}

/// Index plus side-table.
#[derive(Debug, Clone)]
pub struct Catalog {
    index: VectorIndex,
    metadata: MetadataTable,
}

impl Catalog {
    /// An empty catalog following `plan`.
    pub fn new(dimension: VectorDimension, plan: IndexPlan, kmeans: KMeansOptions) -> VecdexResult<Self> {
        Ok(Self {
            index: VectorIndex::from_plan(dimension, plan, kmeans)?,
            metadata: MetadataTable::new(),
        })
    }

    /// Pairs an index with its side-table, checking they agree on count.
    pub fn from_parts(index: VectorIndex, metadata: MetadataTable) -> VecdexResult<Self> {
        metadata.ensure_consistent(index.len())?;
        Ok(Self { index, metadata })
    }

    /// Builds a catalog over a whole corpus.
    ///
    /// The sizing heuristic picks the flavor; an approximate index is
    /// trained on the full corpus before the vectors are added.
    pub fn build(
        dimension: VectorDimension,
        vectors: Vec<Vec<f32>>,
        records: Vec<MetadataRecord>,
        options: &BuildOptions,
    ) -> VecdexResult<Self> {
        if vectors.len() != records.len() {
            return Err(VecdexError::RecordCountMismatch {
                vectors: vectors.len(),
                records: records.len(),
            });
        }

        let plan = options.plan(vectors.len());
        tracing::debug!(target: "vecdex::catalog", "sizing plan for {} vectors: {plan:?}", vectors.len());

        let mut catalog = Self::new(dimension, plan, options.kmeans)?;
        catalog.train(&vectors)?;
        catalog.insert(&vectors, records)?;
        Ok(catalog)
    }

    /// Appends vectors and their records at ordinals `[len, len + n)`.
    ///
    /// Nothing is appended to either side if the index rejects the batch.
    pub fn insert(
        &mut self,
        vectors: &[Vec<f32>],
        records: Vec<MetadataRecord>,
    ) -> VecdexResult<OrdinalRange> {
        if vectors.len() != records.len() {
            return Err(VecdexError::RecordCountMismatch {
                vectors: vectors.len(),
                records: records.len(),
            });
        }

        let range = self.index.add(vectors)?;
        self.metadata.append(range, records)?;
        tracing::debug!(
            target: "vecdex::catalog",
            "inserted ordinals {}..{}",
            range.start,
            range.end
        );
        Ok(range)
    }

    /// Trains the index if it needs it; a no-op otherwise.
    pub fn train(&mut self, samples: &[Vec<f32>]) -> VecdexResult<()> {
        self.index.train(samples)
    }

    pub fn search(&self, query: &[f32], k: usize) -> VecdexResult<Vec<Neighbor>> {
        self.index.search(query, k)
    }

    #[must_use]
    pub fn record(&self, ordinal: Ordinal) -> Option<&MetadataRecord> {
        self.metadata.get(ordinal)
    }

    /// Changes the probe count of a loaded approximate index.
    pub fn set_probes(&mut self, probes: usize) -> VecdexResult<()> {
        self.index.set_probes(probes)
    }

    #[must_use]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    #[must_use]
    pub fn metadata(&self) -> &MetadataTable {
        &self.metadata
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.index.dimension()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.index.is_trained()
    }

    #[must_use]
    pub fn info(&self) -> IndexInfo {
        IndexInfo {
            flavor: self.index.flavor(),
            regions: self.index.regions(),
            probes: self.index.probes(),
            vector_count: self.index.len(),
            dimension: self.index.dimension().get(),
            trained: self.index.is_trained(),
        }
    }

    pub fn save(&self, paths: &ArtifactPaths) -> VecdexResult<()> {
        persistence::save(&self.index, &self.metadata, paths)
    }

    pub fn load(paths: &ArtifactPaths) -> VecdexResult<Self> {
        let (index, metadata) = persistence::load(paths)?;
        Self::from_parts(index, metadata)
    }

    /// Loads the persisted catalog, or builds and saves one from `corpus`
    /// when no artifacts exist yet.
    ///
    /// `corpus` is only called when a build is needed.
    pub fn open_or_build<F>(
        paths: &ArtifactPaths,
        dimension: VectorDimension,
        options: &BuildOptions,
        corpus: F,
    ) -> VecdexResult<Self>
    where
        F: FnOnce() -> VecdexResult<(Vec<Vec<f32>>, Vec<MetadataRecord>)>,
    {
        if paths.exists() {
            let catalog = Self::load(paths)?;
            if catalog.dimension() != dimension {
                return Err(VecdexError::DimensionMismatch {
                    operation: "load",
                    expected: dimension.get(),
                    actual: catalog.dimension().get(),
                });
            }
            return Ok(catalog);
        }

        tracing::info!(
            target: "vecdex::catalog",
            "no index at {}, building a new one",
            paths.index.display()
        );
        let (vectors, records) = corpus()?;
        let catalog = Self::build(dimension, vectors, records, options)?;
        catalog.save(paths)?;
        Ok(catalog)
    }
}

/// Publish point for the catalog readers query.
#[derive(Debug, Clone, Default)]
pub struct SharedCatalog {
    current: Arc<RwLock<Option<Arc<Catalog>>>>,
}

impl SharedCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `catalog` visible to readers, returning the one it replaces.
    pub fn publish(&self, catalog: Catalog) -> Option<Arc<Catalog>> {
        self.current.write().replace(Arc::new(catalog))
    }

    /// The currently published catalog, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<Catalog>> {
        self.current.read().clone()
    }

    pub fn clear(&self) -> Option<Arc<Catalog>> {
        self.current.write().take()
    }

    #[must_use]
    pub fn is_published(&self) -> bool {
        self.current.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{SourceTag, TextChunkRecord};
    use chrono::Utc;
    use tempfile::TempDir;

    fn chunk(i: usize) -> MetadataRecord {
        MetadataRecord::TextChunk(TextChunkRecord {
            text: format!("chunk {i}"),
            source_file: None,
            external_id: Some(format!("doc-{i}")),
            title: None,
            indexed_at: Utc::now(),
            source: SourceTag::Inline,
        })
    }

    fn dim(n: usize) -> VectorDimension {
        VectorDimension::new(n).unwrap()
    }

    #[test]
    fn test_small_corpus_builds_exact() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![5.0, 5.0]];
        let records = (0..3).map(chunk).collect();
        let catalog = Catalog::build(dim(2), vectors, records, &BuildOptions::default()).unwrap();

        let info = catalog.info();
        assert_eq!(info.flavor, IndexFlavor::Exact);
        assert_eq!(info.vector_count, 3);
        assert_eq!(info.regions, None);
        assert!(info.trained);
    }

    #[test]
    fn test_empty_corpus_builds_empty_exact() {
        let catalog =
            Catalog::build(dim(4), Vec::new(), Vec::new(), &BuildOptions::default()).unwrap();
        assert_eq!(catalog.info().flavor, IndexFlavor::Exact);
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_large_corpus_builds_trained_ivf() {
        let vectors: Vec<Vec<f32>> = (0..120)
            .map(|i| vec![(i % 10) as f32, (i / 10) as f32])
            .collect();
        let records = (0..120).map(chunk).collect();
        let catalog = Catalog::build(dim(2), vectors, records, &BuildOptions::default()).unwrap();

        let info = catalog.info();
        assert_eq!(info.flavor, IndexFlavor::Approximate);
        assert_eq!(info.regions, Some(43));
        assert_eq!(info.probes, Some(10));
        assert!(info.trained);
        assert_eq!(catalog.metadata().len(), 120);
    }

    #[test]
    fn test_record_count_mismatch() {
        let mut catalog =
            Catalog::build(dim(2), Vec::new(), Vec::new(), &BuildOptions::default()).unwrap();
        let err = catalog
            .insert(&[vec![1.0, 1.0], vec![2.0, 2.0]], vec![chunk(0)])
            .unwrap_err();
        assert!(matches!(
            err,
            VecdexError::RecordCountMismatch {
                vectors: 2,
                records: 1
            }
        ));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_failed_insert_leaves_both_sides_untouched() {
        let mut catalog =
            Catalog::build(dim(2), vec![vec![0.0, 0.0]], vec![chunk(0)], &BuildOptions::default())
                .unwrap();
        let err = catalog
            .insert(&[vec![1.0, 1.0], vec![1.0]], vec![chunk(1), chunk(2)])
            .unwrap_err();
        assert_eq!(err.status_code(), "DIMENSION_MISMATCH");
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.metadata().len(), 1);
    }

    #[test]
    fn test_open_or_build_builds_once() {
        let dir = TempDir::new().unwrap();
        let paths = ArtifactPaths::new(dir.path().join("i.vdx"), dir.path().join("m.json"));
        let options = BuildOptions::default();

        let built = Catalog::open_or_build(&paths, dim(2), &options, || {
            Ok((vec![vec![1.0, 2.0]], vec![chunk(0)]))
        })
        .unwrap();
        assert_eq!(built.len(), 1);
        assert!(paths.exists());

        let loaded = Catalog::open_or_build(&paths, dim(2), &options, || {
            panic!("corpus must not be read when artifacts exist")
        })
        .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.record(Ordinal::new(0)), built.record(Ordinal::new(0)));
    }

    #[test]
    fn test_shared_catalog_publish_and_swap() {
        let shared = SharedCatalog::new();
        assert!(shared.snapshot().is_none());

        let first =
            Catalog::build(dim(2), vec![vec![1.0, 0.0]], vec![chunk(0)], &BuildOptions::default())
                .unwrap();
        assert!(shared.publish(first).is_none());
        let reader = shared.snapshot().unwrap();

        let second = Catalog::build(
            dim(2),
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![chunk(0), chunk(1)],
            &BuildOptions::default(),
        )
        .unwrap();
        let replaced = shared.publish(second).unwrap();

        // Earlier readers keep their snapshot.
        assert_eq!(reader.len(), 1);
        assert_eq!(replaced.len(), 1);
        assert_eq!(shared.snapshot().unwrap().len(), 2);

        shared.clear();
        assert!(!shared.is_published());
    }
}

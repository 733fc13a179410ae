//! Vector engine that orchestrates building, extending and searching an index.
//!
//! This module is the entry point the CLI talks to. It owns the configured
//! feature extractor, the artifact locations and the [`SharedCatalog`]
//! readers query through, and runs every write as a sequential pipeline
//! (extract, train, add, save) before publishing the result.

use std::path::Path;
use std::sync::Arc;

use indicatif::ProgressBar;
use tokio::sync::Mutex;

use crate::catalog::{Catalog, IndexInfo, SharedCatalog};
use crate::config::Settings;
use crate::error::{VecdexError, VecdexResult};
use crate::extract::{FastEmbedExtractor, FeatureExtractor, PrecomputedExtractor};
use crate::ingest::{IngestReport, Ingestor};
use crate::persistence::ArtifactPaths;
use crate::query::{QueryOutcome, QueryPipeline};
use crate::source::{RawContent, RawItem, load_raw_items};
use crate::vector::VectorDimension;

/// Builds the extractor named by `settings.embedding`.
pub fn extractor_from_settings(
    settings: &Settings,
    show_download_progress: bool,
) -> VecdexResult<Arc<dyn FeatureExtractor>> {
    match settings.embedding.extractor.as_str() {
        "precomputed" => {
            let dimension = VectorDimension::new(settings.embedding.dimension.unwrap_or(0))?;
            Ok(Arc::new(PrecomputedExtractor::new(dimension)))
        }
        "fastembed" => {
            let cache_dir = settings.resolve(&settings.embedding.cache_dir);
            let extractor = FastEmbedExtractor::new(
                &settings.embedding.model,
                &cache_dir,
                show_download_progress,
            )
            .map_err(|source| VecdexError::FeatureExtraction {
                item: format!("model {}", settings.embedding.model),
                source,
            })?;
            Ok(Arc::new(extractor))
        }
        other => Err(VecdexError::InvalidConfig {
            reason: format!("unknown embedding.extractor '{other}'"),
        }),
    }
}

/// Settings-driven facade over one persisted catalog.
pub struct VectorEngine {
    settings: Settings,
    extractor: Arc<dyn FeatureExtractor>,
    paths: ArtifactPaths,
    shared: SharedCatalog,
    /// Serializes build and add within this process.
    writer: Mutex<()>,
}

impl std::fmt::Debug for VectorEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorEngine")
            .field("extractor", &self.extractor.name())
            .field("paths", &self.paths)
            .field("published", &self.shared.is_published())
            .finish()
    }
}

impl VectorEngine {
    /// Creates an engine; nothing is loaded until first use.
    pub fn new(settings: Settings, extractor: Arc<dyn FeatureExtractor>) -> VecdexResult<Self> {
        settings.validate()?;
        let paths = settings.artifact_paths();
        Ok(Self {
            settings,
            extractor,
            paths,
            shared: SharedCatalog::new(),
            writer: Mutex::new(()),
        })
    }

    /// Creates an engine with the extractor named in `settings`.
    pub fn from_settings(settings: Settings, show_download_progress: bool) -> VecdexResult<Self> {
        settings.validate()?;
        let extractor = extractor_from_settings(&settings, show_download_progress)?;
        Self::new(settings, extractor)
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    #[must_use]
    pub fn extractor(&self) -> &Arc<dyn FeatureExtractor> {
        &self.extractor
    }

    /// Handle readers can snapshot independently of the engine.
    #[must_use]
    pub fn shared(&self) -> &SharedCatalog {
        &self.shared
    }

    /// Reads raw items from a directory, JSON catalog or single file.
    pub fn load_items(&self, source: &Path) -> VecdexResult<Vec<RawItem>> {
        load_raw_items(source, &self.settings.json_source_options())
    }

    fn ingestor(&self, progress: Option<ProgressBar>) -> Ingestor {
        let ingestor = Ingestor::new(Arc::clone(&self.extractor), self.settings.ingest_options());
        match progress {
            Some(bar) => ingestor.with_progress(bar),
            None => ingestor,
        }
    }

    /// Builds a fresh catalog from `items`, replacing any persisted one.
    pub async fn build_index(
        &self,
        items: Vec<RawItem>,
        progress: Option<ProgressBar>,
    ) -> VecdexResult<(IndexInfo, IngestReport)> {
        let _guard = self.writer.lock().await;

        let (catalog, report) = self
            .ingestor(progress)
            .build(items, &self.settings.build_options())
            .await?;
        catalog.save(&self.paths)?;

        let info = catalog.info();
        self.publish(catalog)?;
        Ok((info, report))
    }

    /// Appends `items` to the persisted catalog.
    ///
    /// Without a persisted catalog this is a build, so the first batch
    /// still gets a sized index.
    pub async fn add_to_index(
        &self,
        items: Vec<RawItem>,
        progress: Option<ProgressBar>,
    ) -> VecdexResult<IngestReport> {
        let _guard = self.writer.lock().await;

        if !self.paths.exists() {
            tracing::info!(
                target: "vecdex::engine",
                "no index at {}, building from this batch",
                self.paths.index.display()
            );
            let (catalog, report) = self
                .ingestor(progress)
                .build(items, &self.settings.build_options())
                .await?;
            catalog.save(&self.paths)?;
            self.publish(catalog)?;
            return Ok(report);
        }

        // The persisted pair is authoritative; the published copy may carry
        // a query-time probe override that must not be saved.
        let mut catalog = Catalog::load(&self.paths)?;
        let report = self.ingestor(progress).ingest(&mut catalog, items).await?;
        if report.added > 0 {
            catalog.save(&self.paths)?;
        }
        self.publish(catalog)?;
        Ok(report)
    }

    /// The published catalog, loading it from disk on first use.
    pub fn catalog(&self) -> VecdexResult<Arc<Catalog>> {
        if let Some(catalog) = self.shared.snapshot() {
            return Ok(catalog);
        }

        let catalog = Catalog::load(&self.paths)?;
        tracing::info!(
            target: "vecdex::engine",
            "loaded {} index with {} vectors",
            catalog.index().flavor(),
            catalog.len()
        );
        self.publish(catalog)?;
        self.shared
            .snapshot()
            .ok_or_else(|| VecdexError::IndexNotFound {
                path: self.paths.index.clone(),
            })
    }

    /// Extracts a vector from `content` and returns the `k` nearest records.
    pub fn search(&self, content: &RawContent, k: usize) -> VecdexResult<QueryOutcome> {
        let catalog = self.catalog()?;
        QueryPipeline::new(&catalog, self.extractor.as_ref()).query(content, k)
    }

    /// Searches with a ready-made query vector.
    pub fn search_vector(&self, vector: &[f32], k: usize) -> VecdexResult<QueryOutcome> {
        let catalog = self.catalog()?;
        QueryPipeline::new(&catalog, self.extractor.as_ref()).search_vector(vector, k)
    }

    pub fn info(&self) -> VecdexResult<IndexInfo> {
        Ok(self.catalog()?.info())
    }

    /// Applies the query-time probe override and publishes `catalog`.
    fn publish(&self, mut catalog: Catalog) -> VecdexResult<()> {
        if let (Some(requested), Some(regions)) =
            (self.settings.query.probes, catalog.index().regions())
        {
            let probes = requested.min(regions);
            if probes != requested {
                tracing::debug!(
                    target: "vecdex::engine",
                    "clamping probes {requested} to {regions} regions"
                );
            }
            catalog.set_probes(probes)?;
        }

        if self.shared.publish(catalog).is_some() {
            tracing::debug!(target: "vecdex::engine", "replaced published catalog");
        }
        Ok(())
    }
}

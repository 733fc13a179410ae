//! Incremental ingestion: raw items in, vectors and records appended.
//!
//! Features are extracted with bounded concurrency. Each item runs on the
//! blocking pool under its own timeout, so one slow or failing item never
//! stalls the rest of the batch. Failed items are logged and reported as
//! skipped; the batch carries on.
//!
//! Ordinals for a batch always start at the catalog's current vector
//! count, so repeated ingestion into a non-empty catalog never collides
//! with existing entries.

use crate::catalog::{BuildOptions, Catalog};
use crate::error::{VecdexError, VecdexResult};
use crate::extract::{ExtractError, FeatureExtractor};
use crate::metadata::MetadataRecord;
use crate::source::{RawContent, RawItem};
use crate::vector::IndexFlavor;
use chrono::Utc;
use indicatif::ProgressBar;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Default per-item extraction timeout.
pub const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Maximum number of items extracted at once.
    pub concurrency: usize,
    pub item_timeout: Duration,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            item_timeout: DEFAULT_ITEM_TIMEOUT,
        }
    }
}

/// An item that produced no vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    /// Position in the input batch.
    pub position: usize,
    pub label: String,
    pub reason: String,
}

/// Vectors and records extracted from one batch, in input order.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub vectors: Vec<Vec<f32>>,
    pub records: Vec<MetadataRecord>,
    pub skipped: Vec<SkippedItem>,
}

/// Outcome of one ingestion call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Ordinal assigned to the first added vector.
    pub first_ordinal: u32,
    pub added: usize,
    pub skipped: Vec<SkippedItem>,
    /// Whether this call trained the index.
    pub trained: bool,
}

/// Runs feature extraction and appends the results to a catalog.
pub struct Ingestor {
    extractor: Arc<dyn FeatureExtractor>,
    options: IngestOptions,
    progress: Option<ProgressBar>,
}

impl Ingestor {
    pub fn new(extractor: Arc<dyn FeatureExtractor>, options: IngestOptions) -> Self {
        Self {
            extractor,
            options,
            progress: None,
        }
    }

    /// Ticks `bar` once per finished item.
    #[must_use]
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    #[must_use]
    pub fn extractor(&self) -> &Arc<dyn FeatureExtractor> {
        &self.extractor
    }

    /// Extracts features for every item.
    ///
    /// Fails only when a non-empty batch yields no vector at all.
    pub async fn extract(&self, items: Vec<RawItem>) -> VecdexResult<Extracted> {
        let attempted = items.len();
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let timeout = self.options.item_timeout;
        let mut handles = Vec::with_capacity(attempted);

        for item in items {
            let permit = semaphore.clone().acquire_owned().await.map_err(|e| {
                VecdexError::FeatureExtraction {
                    item: item.label(),
                    source: ExtractError::Task(format!("failed to acquire semaphore: {e}")),
                }
            })?;
            let extractor = Arc::clone(&self.extractor);

            handles.push(tokio::spawn(async move {
                let content = item.content.clone();
                let blocking = tokio::task::spawn_blocking(move || {
                    // Released when extraction ends, not when the timeout fires.
                    let _permit = permit;
                    extract_checked(extractor.as_ref(), &content)
                });
                let result = match tokio::time::timeout(timeout, blocking).await {
                    Ok(Ok(extracted)) => extracted,
                    Ok(Err(join)) => Err(ExtractError::Task(join.to_string())),
                    Err(_) => Err(ExtractError::Timeout {
                        seconds: timeout.as_secs(),
                    }),
                };
                (item, result)
            }));
        }

        let indexed_at = Utc::now();
        let mut extracted = Extracted::default();
        for (position, handle) in handles.into_iter().enumerate() {
            let outcome = handle.await;
            if let Some(bar) = &self.progress {
                bar.inc(1);
            }

            match outcome {
                Ok((item, Ok(vector))) => {
                    extracted.records.push(item.to_record(indexed_at));
                    extracted.vectors.push(vector);
                }
                Ok((item, Err(e))) => {
                    let label = item.label();
                    tracing::warn!(target: "vecdex::ingest", "skipping item {position} ({label}): {e}");
                    extracted.skipped.push(SkippedItem {
                        position,
                        label,
                        reason: e.to_string(),
                    });
                }
                Err(join) => {
                    tracing::warn!(target: "vecdex::ingest", "extraction task {position} failed: {join}");
                    extracted.skipped.push(SkippedItem {
                        position,
                        label: format!("item {position}"),
                        reason: join.to_string(),
                    });
                }
            }
        }

        if attempted > 0 && extracted.vectors.is_empty() {
            return Err(VecdexError::FeatureExtraction {
                item: format!("batch of {attempted} items"),
                source: ExtractError::NoValidFeatures { attempted },
            });
        }

        tracing::debug!(
            target: "vecdex::ingest",
            "extracted {} of {attempted} items",
            extracted.vectors.len()
        );
        Ok(extracted)
    }

    /// Adds a batch to an existing catalog.
    ///
    /// Trains the index first if it has never been trained. Nothing is
    /// added when extraction, training or insertion fails.
    pub async fn ingest(&self, catalog: &mut Catalog, items: Vec<RawItem>) -> VecdexResult<IngestReport> {
        self.check_dimension(catalog)?;

        let base = catalog.len();
        let first_ordinal = u32::try_from(base).map_err(|_| VecdexError::OrdinalExhausted)?;
        if items.is_empty() {
            return Ok(IngestReport {
                first_ordinal,
                added: 0,
                skipped: Vec::new(),
                trained: false,
            });
        }

        let Extracted {
            vectors,
            records,
            skipped,
        } = self.extract(items).await?;

        let trained = !catalog.is_trained();
        catalog.train(&vectors)?;
        let range = catalog.insert(&vectors, records)?;
        debug_assert_eq!(range.start.as_index(), base);

        tracing::info!(
            target: "vecdex::ingest",
            "added {} vectors at ordinals {}..{} ({} skipped)",
            range.len(),
            range.start,
            range.end,
            skipped.len()
        );

        Ok(IngestReport {
            first_ordinal: range.start.get(),
            added: range.len(),
            skipped,
            trained,
        })
    }

    /// Builds a new catalog from a whole corpus.
    pub async fn build(
        &self,
        items: Vec<RawItem>,
        options: &BuildOptions,
    ) -> VecdexResult<(Catalog, IngestReport)> {
        let Extracted {
            vectors,
            records,
            skipped,
        } = self.extract(items).await?;

        let added = vectors.len();
        let catalog = Catalog::build(self.extractor.dimension(), vectors, records, options)?;
        let flavor = catalog.index().flavor();
        tracing::info!(
            target: "vecdex::ingest",
            "built {flavor} index over {added} vectors ({} skipped)",
            skipped.len()
        );

        Ok((
            catalog,
            IngestReport {
                first_ordinal: 0,
                added,
                skipped,
                trained: flavor == IndexFlavor::Approximate,
            },
        ))
    }

    fn check_dimension(&self, catalog: &Catalog) -> VecdexResult<()> {
        let produced = self.extractor.dimension();
        if produced != catalog.dimension() {
            return Err(VecdexError::DimensionMismatch {
                operation: "ingest",
                expected: catalog.dimension().get(),
                actual: produced.get(),
            });
        }
        Ok(())
    }
}

/// Runs the extractor and rejects vectors of the wrong length, so one bad
/// item is skipped instead of failing the whole insert.
fn extract_checked(
    extractor: &dyn FeatureExtractor,
    content: &RawContent,
) -> Result<Vec<f32>, ExtractError> {
    let vector = extractor.extract(content)?;
    let expected = extractor.dimension().get();
    if vector.len() != expected {
        return Err(ExtractError::Dimension {
            expected,
            actual: vector.len(),
        });
    }
    Ok(vector)
}

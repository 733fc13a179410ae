//! Batch ingestion against fresh and persisted catalogs.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vecdex::extract::ExtractError;
use vecdex::{
    ArtifactPaths, BuildOptions, Catalog, FeatureExtractor, IngestOptions, Ingestor,
    PrecomputedExtractor, RawContent, RawItem, VecdexError, VectorDimension,
};

/// Fails for any text item, passes embeddings through.
struct FlakyExtractor {
    inner: PrecomputedExtractor,
}

impl FeatureExtractor for FlakyExtractor {
    fn extract(&self, content: &RawContent) -> Result<Vec<f32>, ExtractError> {
        match content {
            RawContent::Text(_) => Err(ExtractError::Model("unreachable resource".to_string())),
            other => self.inner.extract(other),
        }
    }

    fn dimension(&self) -> VectorDimension {
        self.inner.dimension()
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

fn ingestor(dim: usize) -> Ingestor {
    let inner = PrecomputedExtractor::new(VectorDimension::new(dim).unwrap());
    Ingestor::new(
        Arc::new(FlakyExtractor { inner }),
        IngestOptions {
            concurrency: 3,
            item_timeout: Duration::from_secs(5),
        },
    )
}

fn batch(start: usize, count: usize) -> Vec<RawItem> {
    (start..start + count)
        .map(|i| RawItem::embedding(vec![i as f32, (i * i) as f32]).with_external_id(format!("item-{i}")))
        .collect()
}

#[tokio::test]
async fn test_one_failed_item_does_not_abort_the_batch() {
    let mut items = batch(0, 5);
    items[2] = RawItem::text("remote image that never arrives").with_external_id("item-2");

    let (catalog, report) = ingestor(2)
        .build(items, &BuildOptions::default())
        .await
        .unwrap();

    assert_eq!(report.added, 4);
    assert_eq!(catalog.len(), 4);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].position, 2);
    assert!(report.skipped[0].reason.contains("unreachable"));

    // Survivors keep their input order.
    let ids: Vec<_> = catalog
        .metadata()
        .iter()
        .map(|(_, r)| r.external_id().unwrap_or_default().to_string())
        .collect();
    assert_eq!(ids, ["item-0", "item-1", "item-3", "item-4"]);
}

#[tokio::test]
async fn test_ordinals_continue_across_save_and_load() {
    let dir = TempDir::new().unwrap();
    let paths = ArtifactPaths::new(dir.path().join("index.vdx"), dir.path().join("meta.json"));
    let ingestor = ingestor(2);

    let (catalog, first) = ingestor
        .build(batch(0, 3), &BuildOptions::default())
        .await
        .unwrap();
    assert_eq!(first.first_ordinal, 0);
    catalog.save(&paths).unwrap();

    for (round, n) in [(1usize, 4usize), (2, 2)] {
        let mut catalog = Catalog::load(&paths).unwrap();
        let base = catalog.len();
        let report = ingestor
            .ingest(&mut catalog, batch(round * 100, n))
            .await
            .unwrap();
        assert_eq!(report.first_ordinal as usize, base);
        assert_eq!(report.added, n);
        catalog.save(&paths).unwrap();
    }

    let catalog = Catalog::load(&paths).unwrap();
    assert_eq!(catalog.len(), 9);
    assert_eq!(catalog.metadata().len(), 9);

    // Ordinal 3 is the first item of the second batch.
    let hit = catalog.search(&[100.0, 10_000.0], 1).unwrap();
    assert_eq!(hit[0].ordinal.get(), 3);
    let record = catalog.record(hit[0].ordinal).unwrap();
    assert_eq!(record.external_id(), Some("item-100"));
}

#[tokio::test]
async fn test_all_failures_abort_without_changes() {
    let (mut catalog, _) = ingestor(2)
        .build(batch(0, 2), &BuildOptions::default())
        .await
        .unwrap();

    let items = vec![RawItem::text("a"), RawItem::text("b")];
    let err = ingestor(2).ingest(&mut catalog, items).await.unwrap_err();

    assert!(matches!(err, VecdexError::FeatureExtraction { .. }));
    assert_eq!(catalog.len(), 2);
}

#[tokio::test]
async fn test_dimension_mismatch_rejected_before_extraction() {
    let (mut catalog, _) = ingestor(2)
        .build(batch(0, 2), &BuildOptions::default())
        .await
        .unwrap();

    let err = ingestor(3)
        .ingest(&mut catalog, vec![RawItem::embedding(vec![0.0; 3])])
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), "DIMENSION_MISMATCH");
    assert_eq!(catalog.len(), 2);
}

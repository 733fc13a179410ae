//! Build, add and search through the engine with JSON catalogs on disk.

use std::fs;
use tempfile::TempDir;
use vecdex::{IndexFlavor, MetadataRecord, RawContent, Settings, VectorEngine};

fn settings(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.storage.index_path = dir.path().join("store").join("index.vdx");
    settings.storage.metadata_path = dir.path().join("store").join("metadata.json");
    settings.embedding.extractor = "precomputed".to_string();
    settings.embedding.dimension = Some(2);
    settings.ingest.url_key = "image_url".to_string();
    settings
}

fn write_catalog(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

#[tokio::test]
async fn test_catalog_build_add_search() {
    let dir = TempDir::new().unwrap();
    let engine = VectorEngine::from_settings(settings(&dir), false).unwrap();

    let first = write_catalog(
        &dir,
        "products.json",
        r#"{
            "products": [
                {"id": "sku-1", "title": "Trail shoe", "image_url": "https://shop.example/img/trail.jpg", "embedding": [1.0, 0.0]},
                {"id": "sku-2", "title": "Rain boot", "image_url": "https://shop.example/img/boot.jpg", "embedding": [0.0, 1.0]},
                {"id": "sku-3", "title": "Missing everything"},
                {"id": "sku-4", "image_url": "https://shop.example/img/sandal.jpg?size=large", "embedding": [5.0, 5.0]}
            ]
        }"#,
    );

    let items = engine.load_items(&first).unwrap();
    assert_eq!(items.len(), 3);

    let (info, report) = engine.build_index(items, None).await.unwrap();
    assert_eq!(info.flavor, IndexFlavor::Exact);
    assert_eq!(report.added, 3);

    let second = write_catalog(
        &dir,
        "more.json",
        r#"[{"id": 77, "image_url": "https://shop.example/img/slipper.png", "embedding": [0.95, 0.05]}]"#,
    );
    let report = engine
        .add_to_index(engine.load_items(&second).unwrap(), None)
        .await
        .unwrap();
    assert_eq!(report.first_ordinal, 3);

    let outcome = engine
        .search(&RawContent::Embedding(vec![0.9, 0.1]), 3)
        .unwrap();
    let hits = outcome.hits();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].external_id.as_deref(), Some("77"));
    assert_eq!(hits[1].external_id.as_deref(), Some("sku-1"));
    assert!(hits[0].similarity > hits[1].similarity);

    match &hits[1].metadata {
        MetadataRecord::Image(image) => {
            assert_eq!(image.filename, "trail.jpg");
            assert_eq!(image.title.as_deref(), Some("Trail shoe"));
        }
        other => panic!("expected an image record, got {other:?}"),
    }
}

#[tokio::test]
async fn test_second_engine_sees_persisted_state() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(
        &dir,
        "items.json",
        r#"{"items": [{"id": "a", "embedding": [1.0, 1.0]}, {"id": "b", "embedding": [2.0, 2.0]}]}"#,
    );

    let writer = VectorEngine::from_settings(settings(&dir), false).unwrap();
    writer
        .build_index(writer.load_items(&catalog).unwrap(), None)
        .await
        .unwrap();

    let reader = VectorEngine::from_settings(settings(&dir), false).unwrap();
    let outcome = reader.search_vector(&[2.1, 2.1], 1).unwrap();
    assert_eq!(outcome.hits()[0].external_id.as_deref(), Some("b"));
    assert_eq!(reader.info().unwrap().vector_count, 2);
}

#[tokio::test]
async fn test_large_corpus_builds_approximate_index() {
    let dir = TempDir::new().unwrap();
    let entries: Vec<String> = (0..200)
        .map(|i| {
            format!(
                r#"{{"id": "p{i}", "embedding": [{}, {}]}}"#,
                (i % 20) as f32,
                (i / 20) as f32
            )
        })
        .collect();
    let path = write_catalog(&dir, "big.json", &format!("[{}]", entries.join(",")));

    let engine = VectorEngine::from_settings(settings(&dir), false).unwrap();
    let (info, report) = engine
        .build_index(engine.load_items(&path).unwrap(), None)
        .await
        .unwrap();

    assert_eq!(info.flavor, IndexFlavor::Approximate);
    assert!(report.trained);
    // min(floor(4 * sqrt(200)), 200 / 2) = 56, probes = 56 / 4
    assert_eq!(info.regions, Some(56));
    assert_eq!(info.probes, Some(14));

    let outcome = engine.search_vector(&[3.0, 4.0], 1).unwrap();
    assert_eq!(outcome.hits()[0].external_id.as_deref(), Some("p83"));
    assert_eq!(outcome.hits()[0].distance, 0.0);
}

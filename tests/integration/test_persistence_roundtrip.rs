//! Save/load behavior of the index blob and metadata side-table.

use chrono::Utc;
use std::fs;
use tempfile::TempDir;
use vecdex::{
    ArtifactPaths, BuildOptions, Catalog, IndexFlavor, MetadataRecord, SourceTag,
    TextChunkRecord, VecdexError, VectorDimension,
};

fn chunk(i: usize) -> MetadataRecord {
    MetadataRecord::TextChunk(TextChunkRecord {
        text: format!("chunk {i}"),
        source_file: Some("guide.md".to_string()),
        external_id: Some(format!("c{i}")),
        title: None,
        indexed_at: Utc::now(),
        source: SourceTag::Documents,
    })
}

fn grid(count: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|i| vec![(i % 10) as f32, (i / 10) as f32, (i % 7) as f32 * 0.5])
        .collect()
}

fn paths(dir: &TempDir) -> ArtifactPaths {
    ArtifactPaths::new(dir.path().join("index.vdx"), dir.path().join("metadata.json"))
}

fn build(count: usize) -> Catalog {
    let vectors = grid(count);
    let records = (0..count).map(chunk).collect();
    Catalog::build(
        VectorDimension::new(3).unwrap(),
        vectors,
        records,
        &BuildOptions::default(),
    )
    .unwrap()
}

fn assert_same_results(before: &Catalog, after: &Catalog) {
    for query in [[0.5, 0.5, 0.5], [9.0, 11.0, 1.0], [4.2, 3.3, 2.0]] {
        let a = before.search(&query, 7).unwrap();
        let b = after.search(&query, 7).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.ordinal, y.ordinal);
            assert!((x.distance - y.distance).abs() < 1e-6);
        }
    }
}

#[test]
fn test_exact_round_trip() {
    let dir = TempDir::new().unwrap();
    let catalog = build(12);
    assert_eq!(catalog.index().flavor(), IndexFlavor::Exact);

    catalog.save(&paths(&dir)).unwrap();
    let loaded = Catalog::load(&paths(&dir)).unwrap();

    assert_eq!(loaded.info(), catalog.info());
    assert_eq!(loaded.metadata(), catalog.metadata());
    assert_same_results(&catalog, &loaded);
}

#[test]
fn test_approximate_round_trip_stays_trained() {
    let dir = TempDir::new().unwrap();
    let catalog = build(150);
    assert_eq!(catalog.index().flavor(), IndexFlavor::Approximate);

    catalog.save(&paths(&dir)).unwrap();
    let loaded = Catalog::load(&paths(&dir)).unwrap();

    assert!(loaded.is_trained());
    assert_eq!(loaded.index().regions(), catalog.index().regions());
    assert_eq!(loaded.index().probes(), catalog.index().probes());
    assert_same_results(&catalog, &loaded);
}

#[test]
fn test_missing_artifact_is_index_not_found() {
    let dir = TempDir::new().unwrap();
    build(5).save(&paths(&dir)).unwrap();
    fs::remove_file(dir.path().join("metadata.json")).unwrap();

    let err = Catalog::load(&paths(&dir)).unwrap_err();
    assert!(matches!(err, VecdexError::IndexNotFound { .. }));
}

#[test]
fn test_count_disagreement_is_corrupt_metadata() {
    let dir = TempDir::new().unwrap();
    build(5).save(&paths(&dir)).unwrap();

    // Swap in the side-table of a smaller catalog.
    let other = TempDir::new().unwrap();
    build(3).save(&paths(&other)).unwrap();
    fs::copy(
        other.path().join("metadata.json"),
        dir.path().join("metadata.json"),
    )
    .unwrap();

    let err = Catalog::load(&paths(&dir)).unwrap_err();
    assert!(matches!(err, VecdexError::CorruptMetadata { .. }));
}

#[test]
fn test_side_table_is_keyed_by_ordinal() {
    let dir = TempDir::new().unwrap();
    build(3).save(&paths(&dir)).unwrap();

    let raw = fs::read_to_string(dir.path().join("metadata.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["0"]["external_id"], "c0");
    assert_eq!(json["2"]["kind"], "text_chunk");
    assert_eq!(json["2"]["source"], "documents");
}

#[test]
fn test_garbage_blob_is_rejected() {
    let dir = TempDir::new().unwrap();
    build(3).save(&paths(&dir)).unwrap();
    fs::write(dir.path().join("index.vdx"), b"definitely not an index").unwrap();

    let err = Catalog::load(&paths(&dir)).unwrap_err();
    assert!(matches!(
        err,
        VecdexError::CorruptIndex { .. } | VecdexError::Serialization { .. }
    ));
}

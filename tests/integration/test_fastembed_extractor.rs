//! Text embeddings through fastembed.
//!
//! Downloads the model on first run, so these are ignored by default:
//! `cargo test -- --ignored fastembed`

use tempfile::TempDir;
use vecdex::{FastEmbedExtractor, FeatureExtractor, RawContent, similarity};

fn cache_dir(test_name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "vecdex_test_fastembed_{}_{}",
        test_name,
        std::process::id()
    ))
}

fn l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[test]
#[ignore = "downloads an embedding model"]
fn test_fastembed_related_texts_are_closer() {
    let extractor = FastEmbedExtractor::new("AllMiniLML6V2", &cache_dir("related"), false).unwrap();
    assert_eq!(extractor.dimension().get(), 384);

    let shoe = extractor
        .extract(&RawContent::Text("lightweight running shoe".to_string()))
        .unwrap();
    let sneaker = extractor
        .extract(&RawContent::Text("breathable sneaker for jogging".to_string()))
        .unwrap();
    let invoice = extractor
        .extract(&RawContent::Text("quarterly tax invoice".to_string()))
        .unwrap();

    assert!(similarity(l2(&shoe, &sneaker)) > similarity(l2(&shoe, &invoice)));
}

#[test]
#[ignore = "downloads an embedding model"]
fn test_fastembed_reads_text_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("note.md");
    std::fs::write(&path, "# Returns\nItems can be returned within 30 days.").unwrap();

    let extractor = FastEmbedExtractor::new("AllMiniLML6V2", &cache_dir("files"), false).unwrap();
    let vector = extractor.extract(&RawContent::Path(path)).unwrap();
    assert_eq!(vector.len(), 384);
}

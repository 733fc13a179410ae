//! End-to-end query behavior over small hand-checked corpora.

use chrono::Utc;
use vecdex::vector::KMeansOptions;
use vecdex::{
    BuildOptions, Catalog, ExactIndex, IvfIndex, MetadataRecord, PrecomputedExtractor,
    QueryOutcome, QueryPipeline, RawContent, SourceTag, TextChunkRecord, VectorDimension,
    similarity,
};

fn chunk(text: &str) -> MetadataRecord {
    MetadataRecord::TextChunk(TextChunkRecord {
        text: text.to_string(),
        source_file: None,
        external_id: Some(text.to_string()),
        title: None,
        indexed_at: Utc::now(),
        source: SourceTag::Inline,
    })
}

/// Deterministic pseudo-random vectors spread over the unit cube.
fn synthetic(count: usize, dim: usize) -> Vec<Vec<f32>> {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    (0..count)
        .map(|_| {
            (0..dim)
                .map(|_| {
                    state = state
                        .wrapping_mul(6_364_136_223_846_793_005)
                        .wrapping_add(1_442_695_040_888_963_407);
                    (state >> 40) as f32 / (1u64 << 24) as f32
                })
                .collect()
        })
        .collect()
}

#[test]
fn test_three_vector_scenario() {
    let dim = VectorDimension::new(2).unwrap();
    let catalog = Catalog::build(
        dim,
        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![5.0, 5.0]],
        vec![chunk("east"), chunk("north"), chunk("far")],
        &BuildOptions::default(),
    )
    .unwrap();
    let extractor = PrecomputedExtractor::new(dim);

    let outcome = QueryPipeline::new(&catalog, &extractor)
        .query(&RawContent::Embedding(vec![0.9, 0.1]), 2)
        .unwrap();

    let hits = outcome.hits();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].ordinal.get(), 0);
    assert!((hits[0].distance - 0.02).abs() < 1e-5);
    assert_eq!(hits[1].ordinal.get(), 1);
    assert!((hits[1].distance - 1.62).abs() < 1e-5);
    assert!(hits.iter().all(|h| h.ordinal.get() != 2));
    assert_eq!(hits[1].external_id.as_deref(), Some("north"));
}

#[test]
fn test_k_larger_than_corpus_returns_everything() {
    let dim = VectorDimension::new(2).unwrap();
    let catalog = Catalog::build(
        dim,
        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![5.0, 5.0]],
        vec![chunk("a"), chunk("b"), chunk("c")],
        &BuildOptions::default(),
    )
    .unwrap();

    let outcome = QueryPipeline::new(&catalog, &PrecomputedExtractor::new(dim))
        .search_vector(&[0.0, 0.0], 50)
        .unwrap();
    assert_eq!(outcome.hits().len(), 3);

    let distances: Vec<f32> = outcome.hits().iter().map(|h| h.distance).collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_inserted_vector_is_its_own_nearest_neighbour() {
    let dim = VectorDimension::new(8).unwrap();
    let vectors = synthetic(120, 8);
    let records = (0..vectors.len()).map(|i| chunk(&format!("v{i}"))).collect();
    let catalog = Catalog::build(dim, vectors.clone(), records, &BuildOptions::default()).unwrap();
    assert!(catalog.index().regions().is_some());

    for (i, vector) in vectors.iter().enumerate().step_by(17) {
        let top = catalog.search(vector, 1).unwrap();
        assert_eq!(top[0].ordinal.get() as usize, i);
        assert_eq!(top[0].distance, 0.0);
    }
}

#[test]
fn test_full_probe_ivf_matches_exact() {
    let dim = VectorDimension::new(8).unwrap();
    let vectors = synthetic(20, 8);

    let exact = ExactIndex::build(dim, &vectors).unwrap();
    let mut ivf = IvfIndex::new(dim, 4, 4, KMeansOptions::default()).unwrap();
    ivf.train(&vectors).unwrap();
    ivf.add(&vectors).unwrap();

    for query in synthetic(5, 8) {
        let expected = exact.search(&query, 5).unwrap();
        let actual = ivf.search(&query, 5).unwrap();
        assert_eq!(
            expected.iter().map(|n| n.ordinal).collect::<Vec<_>>(),
            actual.iter().map(|n| n.ordinal).collect::<Vec<_>>()
        );
        for (e, a) in expected.iter().zip(&actual) {
            assert!((e.distance - a.distance).abs() < 1e-6);
        }
    }
}

#[test]
fn test_empty_catalog_returns_empty_outcome() {
    let dim = VectorDimension::new(3).unwrap();
    let catalog = Catalog::build(dim, Vec::new(), Vec::new(), &BuildOptions::default()).unwrap();
    let outcome = QueryPipeline::new(&catalog, &PrecomputedExtractor::new(dim))
        .search_vector(&[0.0, 0.0, 0.0], 5)
        .unwrap();
    assert_eq!(outcome, QueryOutcome::Empty);
}

#[test]
fn test_wrong_query_dimension_is_an_error() {
    let dim = VectorDimension::new(2).unwrap();
    let catalog = Catalog::build(
        dim,
        vec![vec![1.0, 0.0]],
        vec![chunk("a")],
        &BuildOptions::default(),
    )
    .unwrap();
    let err = catalog.search(&[1.0, 0.0, 0.0], 1).unwrap_err();
    assert_eq!(err.status_code(), "DIMENSION_MISMATCH");
}

#[test]
fn test_similarity_ordering_follows_distance() {
    assert!(similarity(0.02) > similarity(1.62));
    assert!((similarity(0.0) - 1.0).abs() < f32::EPSILON);
}

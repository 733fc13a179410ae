//! Query pipeline: raw query in, ranked metadata out.
//!
//! The query is turned into a vector by the same feature extractor used for
//! ingestion, searched against the catalog, and every neighbour is joined
//! back to its side-table record. Distances become similarities with
//! `1 / (1 + d)`.

use crate::catalog::Catalog;
use crate::error::{VecdexError, VecdexResult};
use crate::extract::FeatureExtractor;
use crate::metadata::MetadataRecord;
use crate::source::RawContent;
use crate::vector::{Neighbor, Ordinal, Similarity};
use serde::Serialize;

/// Similarity for a squared L2 distance.
#[must_use]
pub fn similarity(distance: f32) -> f32 {
    Similarity::from_distance(distance).get()
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub ordinal: Ordinal,
    pub external_id: Option<String>,
    pub similarity: f32,
    pub distance: f32,
    pub metadata: MetadataRecord,
}

/// Result of a query: hits ascending by distance, or an explicit empty result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "hits", rename_all = "snake_case")]
pub enum QueryOutcome {
    Matches(Vec<SearchHit>),
    Empty,
}

impl QueryOutcome {
    #[must_use]
    pub fn hits(&self) -> &[SearchHit] {
        match self {
            Self::Matches(hits) => hits,
            Self::Empty => &[],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    #[must_use]
    pub fn into_hits(self) -> Vec<SearchHit> {
        match self {
            Self::Matches(hits) => hits,
            Self::Empty => Vec::new(),
        }
    }
}

/// Runs queries against a catalog.
pub struct QueryPipeline<'a> {
    catalog: &'a Catalog,
    extractor: &'a dyn FeatureExtractor,
}

impl<'a> QueryPipeline<'a> {
    pub fn new(catalog: &'a Catalog, extractor: &'a dyn FeatureExtractor) -> Self {
        Self { catalog, extractor }
    }

    /// Extracts a query vector from `content` and searches with it.
    ///
    /// Extraction failures are returned, never swallowed.
    pub fn query(&self, content: &RawContent, k: usize) -> VecdexResult<QueryOutcome> {
        let vector = self
            .extractor
            .extract(content)
            .map_err(|source| VecdexError::FeatureExtraction {
                item: format!("query {}", content.kind()),
                source,
            })?;
        self.search_vector(&vector, k)
    }

    /// Searches with a ready-made query vector.
    pub fn search_vector(&self, vector: &[f32], k: usize) -> VecdexResult<QueryOutcome> {
        let neighbors = self.catalog.search(vector, k)?;
        tracing::debug!(
            target: "vecdex::query",
            "raw neighbours: {:?}",
            neighbors
                .iter()
                .map(|n| (n.ordinal.get(), n.distance))
                .collect::<Vec<_>>()
        );
        Ok(resolve(self.catalog, neighbors))
    }
}

/// Joins neighbours to their records.
///
/// A neighbour without a record is logged and left out rather than failing
/// the whole query.
pub fn resolve(catalog: &Catalog, mut neighbors: Vec<Neighbor>) -> QueryOutcome {
    neighbors.sort_by(Neighbor::rank);

    let hits: Vec<SearchHit> = neighbors
        .into_iter()
        .filter_map(|neighbor| {
            let Some(record) = catalog.record(neighbor.ordinal) else {
                tracing::warn!(
                    target: "vecdex::query",
                    "no metadata for ordinal {}, excluding it from results",
                    neighbor.ordinal
                );
                return None;
            };
            Some(SearchHit {
                ordinal: neighbor.ordinal,
                external_id: record.external_id().map(str::to_string),
                similarity: similarity(neighbor.distance),
                distance: neighbor.distance,
                metadata: record.clone(),
            })
        })
        .collect();

    if hits.is_empty() {
        QueryOutcome::Empty
    } else {
        QueryOutcome::Matches(hits)
    }
}

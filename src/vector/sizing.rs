//! Index selector: picks the index flavor and region count from corpus size.
//!
//! Runs once at build time. A loaded index keeps its persisted regions;
//! only probes can be changed afterwards.

use serde::{Deserialize, Serialize};

/// Corpora below this size use the exact index.
pub const DEFAULT_EXACT_THRESHOLD: usize = 50;

/// Corpora below this size use the `sqrt(n)` region band.
const LARGE_CORPUS_THRESHOLD: usize = 100;

/// Outcome of the sizing heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexPlan {
    Exact,
    Approximate { regions: usize, probes: usize },
}

/// Region count for an approximate index over `corpus_size` vectors.
///
/// Below 100 vectors this is `max(1, sqrt(n))`, otherwise
/// `min(4 * sqrt(n), n / 2)`.
#[must_use]
pub fn calculate_regions(corpus_size: usize) -> usize {
    let root = (corpus_size as f64).sqrt();
    if corpus_size < LARGE_CORPUS_THRESHOLD {
        (root as usize).max(1)
    } else {
        ((4.0 * root) as usize).min(corpus_size / 2)
    }
}

/// Default probe count: a quarter of the regions, at least one.
#[must_use]
pub fn default_probes(regions: usize) -> usize {
    (regions / 4).max(1)
}

/// Chooses the index for a corpus of `corpus_size` vectors.
#[must_use]
pub fn plan_index(corpus_size: usize, exact_threshold: usize) -> IndexPlan {
    if corpus_size < exact_threshold {
        return IndexPlan::Exact;
    }
    let regions = calculate_regions(corpus_size);
    IndexPlan::Approximate {
        regions,
        probes: default_probes(regions),
    }
}

impl IndexPlan {
    /// Applies explicit region/probe overrides to an approximate plan.
    ///
    /// Regions are capped at the corpus size so training always has enough
    /// samples, and probes are clamped into `1..=regions`.
    #[must_use]
    pub fn with_overrides(
        self,
        corpus_size: usize,
        regions: Option<usize>,
        probes: Option<usize>,
    ) -> Self {
        match self {
            Self::Exact => Self::Exact,
            Self::Approximate {
                regions: planned_regions,
                probes: planned_probes,
            } => {
                let regions = regions
                    .unwrap_or(planned_regions)
                    .clamp(1, corpus_size.max(1));
                let probes = match probes {
                    Some(p) => p,
                    None if regions == planned_regions => planned_probes,
                    None => default_probes(regions),
                }
                .clamp(1, regions);
                Self::Approximate { regions, probes }
            }
        }
    }
}

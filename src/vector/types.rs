//! Type-safe wrappers and core types for the vector index.
//!
//! Ordinals, regions, dimensions and similarity scores are wrapped in
//! newtypes so a region number can never be passed where an ordinal is
//! expected, and so dimension checks happen in one place.

use crate::error::{VecdexError, VecdexResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Position of a vector in insertion order.
///
/// Ordinals are dense, start at zero and are never reused. The metadata
/// side-table is keyed by the decimal form of the ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ordinal(u32);

impl Ordinal {
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Converts a collection position into an ordinal.
    ///
    /// Fails once the index holds more vectors than a u32 can address.
    pub fn from_index(index: usize) -> VecdexResult<Self> {
        u32::try_from(index)
            .map(Self)
            .map_err(|_| VecdexError::OrdinalExhausted)
    }

    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn as_index(&self) -> usize {
        self.0 as usize
    }

    /// The string key used by the metadata side-table.
    #[must_use]
    pub fn key(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for Ordinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open range of ordinals assigned by one insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrdinalRange {
    pub start: Ordinal,
    pub end: Ordinal,
}

impl OrdinalRange {
    /// Range of `count` ordinals starting at `base`.
    pub fn starting_at(base: usize, count: usize) -> VecdexResult<Self> {
        let end = base
            .checked_add(count)
            .ok_or(VecdexError::OrdinalExhausted)?;
        Ok(Self {
            start: Ordinal::from_index(base)?,
            end: Ordinal::from_index(end)?,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        (self.end.get() - self.start.get()) as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn iter(&self) -> impl Iterator<Item = Ordinal> + use<> {
        (self.start.get()..self.end.get()).map(Ordinal::new)
    }
}

/// Identifier of a region (cluster) in the inverted-file index.
///
/// Regions are numbered from zero in centroid order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(u32);

impl RegionId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn as_index(&self) -> usize {
        self.0 as usize
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// Fixed at index creation; every vector added or queried must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension`, rejecting zero.
    pub fn new(dim: usize) -> VecdexResult<Self> {
        if dim == 0 {
            return Err(VecdexError::InvalidParameter {
                name: "dimension",
                value: "0".to_string(),
                reason: "vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, operation: &'static str, vector: &[f32]) -> VecdexResult<()> {
        if vector.len() != self.0 {
            return Err(VecdexError::DimensionMismatch {
                operation,
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Validates a whole batch before anything is mutated.
    pub fn validate_batch(&self, operation: &'static str, vectors: &[Vec<f32>]) -> VecdexResult<()> {
        vectors
            .iter()
            .try_for_each(|v| self.validate_vector(operation, v))
    }
}

impl fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which search structure backs an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexFlavor {
    /// Brute-force L2 over every stored vector.
    Exact,
    /// Inverted-file index over k-means regions.
    Approximate,
}

impl IndexFlavor {
    pub(crate) const fn tag(self) -> u32 {
        match self {
            Self::Exact => 1,
            Self::Approximate => 2,
        }
    }

    pub(crate) const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::Exact),
            2 => Some(Self::Approximate),
            _ => None,
        }
    }
}

impl fmt::Display for IndexFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Approximate => write!(f, "ivf-flat"),
        }
    }
}

/// Similarity derived from an L2 distance: `1 / (1 + d)`.
///
/// Always in `(0, 1]`, equal to 1 only at distance zero, and strictly
/// decreasing in the distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Similarity(f32);

impl Similarity {
    #[must_use]
    pub fn from_distance(distance: f32) -> Self {
        Self(1.0 / (1.0 + distance.max(0.0)))
    }

    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Similarity {}

impl PartialOrd for Similarity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Similarity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A search result before metadata resolution.
///
/// `distance` is the squared Euclidean distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub ordinal: Ordinal,
    pub distance: f32,
}

impl Neighbor {
    /// Ascending distance, ties broken by lower ordinal.
    pub fn rank(a: &Self, b: &Self) -> Ordering {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.ordinal.cmp(&b.ordinal))
    }
}

//! Vector storage and nearest-neighbour search.
//!
//! Two index flavors share one storage layout: the exact index scans every
//! vector, the IVF-Flat index partitions vectors into k-means regions and
//! scans only the regions nearest the query. The sizing heuristic picks
//! between them at build time.

mod clustering;
mod flat;
mod index;
mod ivf;
mod sizing;
mod storage;
mod types;

pub use clustering::{
    ClusteringError, DEFAULT_MAX_ITERATIONS, KMeansOptions, KMeansResult,
    assign_to_nearest_centroid, kmeans_clustering, nearest_centroids, squared_l2,
};
pub use flat::ExactIndex;
pub use index::{NearestNeighbors, VectorIndex};
pub use ivf::IvfIndex;
pub use sizing::{
    DEFAULT_EXACT_THRESHOLD, IndexPlan, calculate_regions, default_probes, plan_index,
};
pub use storage::VectorStorage;
pub use types::{
    IndexFlavor, Neighbor, Ordinal, OrdinalRange, RegionId, Similarity, VectorDimension,
};

//! The main library module for vecdex
//!
//! A vector index engine: exact and inverted-file nearest-neighbour search
//! over fixed-dimension vectors, a metadata side-table joined to every
//! result, durable persistence and incremental ingestion.

pub mod catalog;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod metadata;
pub mod persistence;
pub mod query;
pub mod source;
pub mod vector;

// Explicit exports for better API clarity
pub use catalog::{BuildOptions, Catalog, IndexInfo, SharedCatalog};
pub use config::Settings;
pub use engine::VectorEngine;
pub use error::{VecdexError, VecdexResult};
pub use extract::{ExtractError, FastEmbedExtractor, FeatureExtractor, PrecomputedExtractor};
pub use ingest::{IngestOptions, IngestReport, Ingestor, SkippedItem};
pub use metadata::{ImageRecord, MetadataRecord, MetadataTable, SourceTag, TextChunkRecord};
pub use persistence::ArtifactPaths;
pub use query::{QueryOutcome, QueryPipeline, SearchHit, similarity};
pub use source::{RawContent, RawItem, load_raw_items};
pub use vector::{
    ExactIndex, IndexFlavor, IndexPlan, IvfIndex, NearestNeighbors, Neighbor, Ordinal,
    VectorDimension, VectorIndex,
};

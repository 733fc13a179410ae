//! Persistence of an index and its metadata side-table.
//!
//! Two artifacts make up one persisted index:
//!
//! - the index blob: a 16-byte header followed by a bincode body
//! - the side-table: a JSON object keyed by ordinal string
//!
//! # Blob Format
//!
//! - Header (16 bytes): magic `VDXI`, format version, flavor tag, dimension,
//!   each a little-endian u32 after the magic
//! - Body: bincode-encoded vectors (and centroids/assignments for IVF)
//!
//! Both artifacts are written to temp files next to their targets and
//! renamed into place, index blob first. A crash between the two renames
//! leaves a count mismatch that [`load`] reports as `CorruptMetadata`.

use crate::error::{IoContext, VecdexError, VecdexResult};
use crate::metadata::MetadataTable;
use crate::vector::{
    ExactIndex, IndexFlavor, IvfIndex, KMeansOptions, NearestNeighbors, RegionId, VectorDimension,
    VectorIndex, VectorStorage,
};
use bincode::{Decode, Encode};
use memmap2::MmapOptions;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current blob format version.
const FORMAT_VERSION: u32 = 1;

/// Size of the blob header in bytes.
const HEADER_SIZE: usize = 16;

/// Magic bytes identifying an index blob.
const MAGIC_BYTES: &[u8; 4] = b"VDXI";

/// Locations of the two artifacts of one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub index: PathBuf,
    pub metadata: PathBuf,
}

impl ArtifactPaths {
    pub fn new(index: impl Into<PathBuf>, metadata: impl Into<PathBuf>) -> Self {
        Self {
            index: index.into(),
            metadata: metadata.into(),
        }
    }

    /// Whether both artifacts are present.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.index.is_file() && self.metadata.is_file()
    }
}

#[derive(Encode, Decode)]
struct ExactSnapshot {
    vectors: Vec<f32>,
}

#[derive(Encode, Decode)]
struct IvfSnapshot {
    regions: u32,
    probes: u32,
    max_iterations: u32,
    tolerance: f32,
    seed: u64,
    /// Centroids flattened in region order.
    centroids: Vec<f32>,
    assignments: Vec<u32>,
    vectors: Vec<f32>,
}

/// Writes the index blob and the side-table.
///
/// Fails without touching disk if the side-table does not cover every
/// vector, or if an approximate index has not been trained.
pub fn save(
    index: &VectorIndex,
    metadata: &MetadataTable,
    paths: &ArtifactPaths,
) -> VecdexResult<()> {
    metadata.ensure_consistent(index.len())?;
    if !index.is_trained() {
        return Err(VecdexError::NotTrained { operation: "save" });
    }

    let blob = encode_index(index, &paths.index)?;
    let json = serde_json::to_vec_pretty(metadata).map_err(|e| VecdexError::Serialization {
        path: paths.metadata.clone(),
        reason: e.to_string(),
    })?;

    let staged_index = stage(&paths.index, &blob)?;
    let staged_metadata = stage(&paths.metadata, &json)?;

    commit(staged_index, &paths.index)?;
    commit(staged_metadata, &paths.metadata)?;

    tracing::info!(
        target: "vecdex::persistence",
        "saved {} index with {} vectors to {}",
        index.flavor(),
        index.len(),
        paths.index.display()
    );
    Ok(())
}

/// Reads both artifacts back.
///
/// An approximate index comes back trained. Fails with `IndexNotFound` if
/// either artifact is missing.
pub fn load(paths: &ArtifactPaths) -> VecdexResult<(VectorIndex, MetadataTable)> {
    for path in [&paths.index, &paths.metadata] {
        if !path.is_file() {
            return Err(VecdexError::IndexNotFound { path: path.clone() });
        }
    }

    let index = read_index(&paths.index)?;

    let json = std::fs::read(&paths.metadata).with_path(&paths.metadata)?;
    let metadata: MetadataTable =
        serde_json::from_slice(&json).map_err(|e| VecdexError::CorruptMetadata {
            reason: format!("{}: {e}", paths.metadata.display()),
        })?;
    metadata.ensure_consistent(index.len())?;

    tracing::info!(
        target: "vecdex::persistence",
        "loaded {} index with {} vectors from {}",
        index.flavor(),
        index.len(),
        paths.index.display()
    );
    Ok((index, metadata))
}

fn encode_index(index: &VectorIndex, path: &Path) -> VecdexResult<Vec<u8>> {
    let config = bincode::config::standard();
    let body = match index {
        VectorIndex::Exact(exact) => {
            let snapshot = ExactSnapshot {
                vectors: exact.storage().as_slice().to_vec(),
            };
            bincode::encode_to_vec(&snapshot, config)
        }
        VectorIndex::Approximate(ivf) => {
            let kmeans = ivf.kmeans();
            let snapshot = IvfSnapshot {
                regions: ivf.regions() as u32,
                probes: ivf.probes() as u32,
                max_iterations: kmeans.max_iterations as u32,
                tolerance: kmeans.tolerance,
                seed: kmeans.seed,
                centroids: ivf.centroids().concat(),
                assignments: ivf.assignments().iter().map(RegionId::get).collect(),
                vectors: ivf.storage().as_slice().to_vec(),
            };
            bincode::encode_to_vec(&snapshot, config)
        }
    }
    .map_err(|e| VecdexError::Serialization {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut blob = Vec::with_capacity(HEADER_SIZE + body.len());
    blob.extend_from_slice(MAGIC_BYTES);
    blob.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    blob.extend_from_slice(&index.flavor().tag().to_le_bytes());
    blob.extend_from_slice(&(index.dimension().get() as u32).to_le_bytes());
    blob.extend_from_slice(&body);
    Ok(blob)
}

fn read_index(path: &Path) -> VecdexResult<VectorIndex> {
    let file = File::open(path).with_path(path)?;
    let file_len = file.metadata().with_path(path)?.len();
    if file_len < HEADER_SIZE as u64 {
        return Err(VecdexError::CorruptIndex {
            reason: format!("{} is too small to contain a header", path.display()),
        });
    }

    // SAFETY: the blob is only ever replaced by rename, never modified in
    // place, so the mapped pages stay valid for the lifetime of `mmap`.
    let mmap = unsafe { MmapOptions::new().map(&file) }.with_path(path)?;

    let (flavor, dimension) = read_header(&mmap)?;
    let body = &mmap[HEADER_SIZE..];
    let config = bincode::config::standard();
    let corrupt = |e: bincode::error::DecodeError| VecdexError::CorruptIndex {
        reason: format!("{}: {e}", path.display()),
    };

    match flavor {
        IndexFlavor::Exact => {
            let (snapshot, _): (ExactSnapshot, usize) =
                bincode::decode_from_slice(body, config).map_err(corrupt)?;
            let storage = VectorStorage::from_raw(dimension, snapshot.vectors)?;
            Ok(VectorIndex::Exact(ExactIndex::from_storage(storage)))
        }
        IndexFlavor::Approximate => {
            let (snapshot, _): (IvfSnapshot, usize) =
                bincode::decode_from_slice(body, config).map_err(corrupt)?;
            let storage = VectorStorage::from_raw(dimension, snapshot.vectors)?;

            if snapshot.centroids.len() % dimension.get() != 0 {
                return Err(VecdexError::CorruptIndex {
                    reason: "centroid buffer does not match the index dimension".to_string(),
                });
            }
            let centroids = snapshot
                .centroids
                .chunks_exact(dimension.get())
                .map(<[f32]>::to_vec)
                .collect();
            let assignments = snapshot.assignments.into_iter().map(RegionId::new).collect();
            let kmeans = KMeansOptions {
                max_iterations: snapshot.max_iterations as usize,
                tolerance: snapshot.tolerance,
                seed: snapshot.seed,
            };

            let ivf = IvfIndex::from_parts(
                snapshot.regions as usize,
                snapshot.probes as usize,
                kmeans,
                centroids,
                assignments,
                storage,
            )?;
            Ok(VectorIndex::Approximate(ivf))
        }
    }
}

fn read_header(bytes: &[u8]) -> VecdexResult<(IndexFlavor, VectorDimension)> {
    if bytes.len() < HEADER_SIZE {
        return Err(VecdexError::CorruptIndex {
            reason: "file too small to contain header".to_string(),
        });
    }

    if &bytes[0..4] != MAGIC_BYTES {
        return Err(VecdexError::CorruptIndex {
            reason: "invalid magic bytes".to_string(),
        });
    }

    let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

    let version = word(4);
    if version != FORMAT_VERSION {
        return Err(VecdexError::VersionMismatch {
            expected: FORMAT_VERSION,
            actual: version,
        });
    }

    let flavor = IndexFlavor::from_tag(word(8)).ok_or_else(|| VecdexError::CorruptIndex {
        reason: format!("unknown index flavor tag {}", word(8)),
    })?;
    let dimension =
        VectorDimension::new(word(12) as usize).map_err(|_| VecdexError::CorruptIndex {
            reason: "header declares a zero dimension".to_string(),
        })?;

    Ok((flavor, dimension))
}

/// Writes `bytes` to a synced temp file in the target's directory.
fn stage(target: &Path, bytes: &[u8]) -> VecdexResult<NamedTempFile> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).with_path(&parent)?;

    let mut temp = NamedTempFile::new_in(&parent).with_path(&parent)?;
    temp.write_all(bytes).with_path(target)?;
    temp.as_file().sync_all().with_path(target)?;
    Ok(temp)
}

fn commit(staged: NamedTempFile, target: &Path) -> VecdexResult<()> {
    staged
        .persist(target)
        .map(|_| ())
        .map_err(|e| VecdexError::Io {
            path: target.to_path_buf(),
            source: e.error,
        })
}

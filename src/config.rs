//! Configuration module for the vector index engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.vecdex/settings.toml`)
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `VECDEX_` and use double
//! underscores to separate nested levels:
//! - `VECDEX_INDEX__EXACT_THRESHOLD=100` sets `index.exact_threshold`
//! - `VECDEX_QUERY__PROBES=8` sets `query.probes`
//! - `VECDEX_INGEST__ITEM_TIMEOUT_SECS=30` sets `ingest.item_timeout_secs`

use crate::catalog::BuildOptions;
use crate::error::{VecdexError, VecdexResult};
use crate::ingest::IngestOptions;
use crate::persistence::ArtifactPaths;
use crate::source::JsonSourceOptions;
use crate::vector::{DEFAULT_EXACT_THRESHOLD, DEFAULT_MAX_ITERATIONS, KMeansOptions};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding settings and default artifacts.
pub const CONFIG_DIR: &str = ".vecdex";

const ENV_PREFIX: &str = "VECDEX_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Global debug mode
    #[serde(default)]
    pub debug: bool,

    /// Workspace root directory (where .vecdex is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// Where the two index artifacts live.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,
}

/// Index construction parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IndexConfig {
    /// Corpora smaller than this use exact search
    #[serde(default = "default_exact_threshold")]
    pub exact_threshold: usize,

    /// Fixed region count instead of the sizing heuristic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<usize>,

    /// Probe count stored with a newly built index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probes: Option<usize>,

    /// Cap on k-means iterations during training
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Seed for k-means++ initialization
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Feature extraction during ingestion.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IngestConfig {
    /// Items extracted concurrently (defaults to CPU count)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-item extraction timeout
    #[serde(default = "default_item_timeout_secs")]
    pub item_timeout_secs: u64,

    /// JSON catalog field holding the image URL
    #[serde(default = "default_url_key")]
    pub url_key: String,

    /// Read at most this many catalog entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct QueryConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Probe count applied to a loaded approximate index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probes: Option<usize>,
}

/// Which feature extractor to use.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// `fastembed` or `precomputed`
    #[serde(default = "default_extractor")]
    pub extractor: String,

    /// fastembed model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Vector dimension for the precomputed extractor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
}

fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("index.vdx")
}
fn default_metadata_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("metadata.json")
}
fn default_exact_threshold() -> usize {
    DEFAULT_EXACT_THRESHOLD
}
fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}
fn default_seed() -> u64 {
    42
}
fn default_concurrency() -> usize {
    num_cpus::get()
}
fn default_item_timeout_secs() -> u64 {
    10
}
fn default_url_key() -> String {
    "image".to_string()
}
fn default_k() -> usize {
    5
}
fn default_extractor() -> String {
    "fastembed".to_string()
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("models")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            debug: false,
            workspace_root: None,
            storage: StorageConfig::default(),
            index: IndexConfig::default(),
            ingest: IngestConfig::default(),
            query: QueryConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            metadata_path: default_metadata_path(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            exact_threshold: default_exact_threshold(),
            regions: None,
            probes: None,
            max_iterations: default_max_iterations(),
            seed: default_seed(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            item_timeout_secs: default_item_timeout_secs(),
            url_key: default_url_key(),
            max_items: None,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            probes: None,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            extractor: default_extractor(),
            model: default_embedding_model(),
            cache_dir: default_cache_dir(),
            dimension: None,
        }
    }
}

fn env_layer() -> Env {
    // Double underscore separates nesting; single underscores stay in field names.
    Env::prefixed(ENV_PREFIX).map(|key| key.as_str().to_lowercase().replace("__", ".").into())
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(env_layer())
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(env_layer())
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for a .vecdex directory from the
    /// current directory upwards
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .vecdex is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# Vecdex Configuration File

# Version of the configuration schema
version = 1

# Global debug mode
debug = false

[storage]
# Index blob and metadata side-table (relative to workspace root)
index_path = ".vecdex/index.vdx"
metadata_path = ".vecdex/metadata.json"

[index]
# Corpora with fewer vectors than this use exact search
exact_threshold = {DEFAULT_EXACT_THRESHOLD}

# Fixed region count; leave unset to size from the corpus
# regions = 64

# Regions searched per query; defaults to a quarter of the regions
# probes = 16

# k-means training
max_iterations = {DEFAULT_MAX_ITERATIONS}
seed = 42

[ingest]
# Items extracted concurrently (defaults to CPU count)
# concurrency = {}

# Seconds before a single item's extraction is abandoned
item_timeout_secs = 10

# JSON catalog field holding the image URL
url_key = "image"

# max_items = 1000

[query]
default_k = 5

# Override probes of a loaded approximate index
# probes = 10

[embedding]
# "fastembed" embeds text; "precomputed" expects items with an embedding
extractor = "fastembed"
model = "AllMiniLML6V2"
cache_dir = ".vecdex/models"

# Required for the precomputed extractor
# dimension = 384
"#,
            num_cpus::get()
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }

    /// Rejects values no operation could run with.
    pub fn validate(&self) -> VecdexResult<()> {
        let invalid = |reason: String| Err(VecdexError::InvalidConfig { reason });

        if self.index.regions == Some(0) {
            return invalid("index.regions must be at least 1".to_string());
        }
        if self.index.probes == Some(0) || self.query.probes == Some(0) {
            return invalid("probes must be at least 1".to_string());
        }
        if let (Some(regions), Some(probes)) = (self.index.regions, self.index.probes) {
            if probes > regions {
                return invalid(format!(
                    "index.probes ({probes}) exceeds index.regions ({regions})"
                ));
            }
        }
        if self.index.max_iterations == 0 {
            return invalid("index.max_iterations must be at least 1".to_string());
        }
        if self.ingest.concurrency == 0 {
            return invalid("ingest.concurrency must be at least 1".to_string());
        }
        if self.ingest.item_timeout_secs == 0 {
            return invalid("ingest.item_timeout_secs must be at least 1".to_string());
        }
        if self.query.default_k == 0 {
            return invalid("query.default_k must be at least 1".to_string());
        }
        match self.embedding.extractor.as_str() {
            "fastembed" => {}
            "precomputed" if self.embedding.dimension.unwrap_or(0) > 0 => {}
            "precomputed" => {
                return invalid(
                    "embedding.dimension is required for the precomputed extractor".to_string(),
                );
            }
            other => {
                return invalid(format!(
                    "unknown embedding.extractor '{other}', expected 'fastembed' or 'precomputed'"
                ));
            }
        }
        Ok(())
    }

    /// Resolves a configured path against the workspace root.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.workspace_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    #[must_use]
    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(
            self.resolve(&self.storage.index_path),
            self.resolve(&self.storage.metadata_path),
        )
    }

    #[must_use]
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            exact_threshold: self.index.exact_threshold,
            regions: self.index.regions,
            probes: self.index.probes,
            kmeans: KMeansOptions {
                max_iterations: self.index.max_iterations,
                seed: self.index.seed,
                ..KMeansOptions::default()
            },
        }
    }

    #[must_use]
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            concurrency: self.ingest.concurrency,
            item_timeout: Duration::from_secs(self.ingest.item_timeout_secs),
        }
    }

    #[must_use]
    pub fn json_source_options(&self) -> JsonSourceOptions {
        JsonSourceOptions {
            url_key: self.ingest.url_key.clone(),
            max_items: self.ingest.max_items,
        }
    }
}

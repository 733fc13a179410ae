//! Feature extraction: turning raw content into fixed-length vectors.
//!
//! The index only ever sees vectors. A [`FeatureExtractor`] is the seam
//! where text, files or caller-supplied embeddings become vectors of the
//! index's dimension.

use crate::source::RawContent;
use crate::vector::VectorDimension;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// File extensions the text extractor reads as UTF-8.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

/// Why a single item produced no vector.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("{extractor} extractor cannot handle {kind} content")]
    Unsupported {
        kind: &'static str,
        extractor: &'static str,
    },

    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("embedding model error: {0}")]
    Model(String),

    #[error("extraction timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("extractor produced a {actual}-dimensional vector, expected {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("extraction task failed: {0}")]
    Task(String),

    #[error("no valid features extracted from {attempted} items")]
    NoValidFeatures { attempted: usize },
}

/// Turns raw content into a vector.
///
/// Implementations must be thread-safe; ingestion calls them from a
/// blocking thread pool.
pub trait FeatureExtractor: Send + Sync {
    /// Extracts one vector of length [`FeatureExtractor::dimension`].
    fn extract(&self, content: &RawContent) -> Result<Vec<f32>, ExtractError>;

    /// Dimension of every vector this extractor produces.
    fn dimension(&self) -> VectorDimension;

    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Extracts a batch, one result per input.
    fn extract_batch(&self, contents: &[RawContent]) -> Vec<Result<Vec<f32>, ExtractError>> {
        contents.iter().map(|c| self.extract(c)).collect()
    }
}

fn check_dimension(expected: VectorDimension, vector: Vec<f32>) -> Result<Vec<f32>, ExtractError> {
    if vector.len() != expected.get() {
        return Err(ExtractError::Dimension {
            expected: expected.get(),
            actual: vector.len(),
        });
    }
    Ok(vector)
}

/// Accepts only content that already carries an embedding.
#[derive(Debug, Clone, Copy)]
pub struct PrecomputedExtractor {
    dimension: VectorDimension,
}

impl PrecomputedExtractor {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }
}

impl FeatureExtractor for PrecomputedExtractor {
    fn extract(&self, content: &RawContent) -> Result<Vec<f32>, ExtractError> {
        match content {
            RawContent::Embedding(vector) => check_dimension(self.dimension, vector.clone()),
            other => Err(ExtractError::Unsupported {
                kind: other.kind(),
                extractor: self.name(),
            }),
        }
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "precomputed"
    }
}

/// Maps a configured model name to a fastembed model.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, ExtractError> {
    match name {
        "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" => Ok(EmbeddingModel::BGEBaseENV15),
        "MultilingualE5Small" => Ok(EmbeddingModel::MultilingualE5Small),
        other => Err(ExtractError::Model(format!(
            "unknown embedding model '{other}'. Supported: AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, MultilingualE5Small"
        ))),
    }
}

/// Text embeddings via fastembed.
///
/// Embeds inline text and the contents of `.txt` / `.md` files. Content
/// that already carries an embedding passes through unchanged. Images and
/// remote URLs are not handled here.
pub struct FastEmbedExtractor {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
}

impl std::fmt::Debug for FastEmbedExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedExtractor")
            .field("model", &"<TextEmbedding>")
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedExtractor {
    /// Loads `model_name`, downloading it into `cache_dir` on first use.
    pub fn new(
        model_name: &str,
        cache_dir: &Path,
        show_download_progress: bool,
    ) -> Result<Self, ExtractError> {
        let model = parse_embedding_model(model_name)?;
        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| {
            ExtractError::Model(format!(
                "failed to initialize {model_name}: {e}. First use needs network access to download the model"
            ))
        })?;

        // Probe the output size instead of hard-coding it per model.
        let probe = text_model
            .embed(vec!["dimension probe"], None)
            .map_err(|e| ExtractError::Model(e.to_string()))?;
        let actual = probe.first().map_or(0, Vec::len);
        let dimension = VectorDimension::new(actual).map_err(|_| {
            ExtractError::Model(format!("{model_name} produced an empty embedding"))
        })?;

        tracing::info!(
            target: "vecdex::extract",
            "loaded embedding model {model_name} ({dimension} dimensions)"
        );

        Ok(Self {
            model: Mutex::new(text_model),
            dimension,
        })
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, ExtractError> {
        let mut embeddings = self
            .model
            .lock()
            .map_err(|_| ExtractError::Model("embedding model lock poisoned".to_string()))?
            .embed(vec![text], None)
            .map_err(|e| ExtractError::Model(format!("failed to generate embedding: {e}")))?;

        let embedding = embeddings
            .pop()
            .ok_or_else(|| ExtractError::Model("model returned no embedding".to_string()))?;
        check_dimension(self.dimension, embedding)
    }
}

impl FeatureExtractor for FastEmbedExtractor {
    fn extract(&self, content: &RawContent) -> Result<Vec<f32>, ExtractError> {
        match content {
            RawContent::Text(text) => self.embed_text(text),
            RawContent::Path(path) if is_text_file(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ExtractError::Io {
                    path: path.clone(),
                    source,
                })?;
                self.embed_text(&text)
            }
            RawContent::Embedding(vector) => check_dimension(self.dimension, vector.clone()),
            other => Err(ExtractError::Unsupported {
                kind: other.kind(),
                extractor: self.name(),
            }),
        }
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "fastembed"
    }
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precomputed_passes_matching_embeddings() {
        let extractor = PrecomputedExtractor::new(VectorDimension::new(3).unwrap());
        let vector = extractor
            .extract(&RawContent::Embedding(vec![0.1, 0.2, 0.3]))
            .unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_precomputed_rejects_other_content() {
        let extractor = PrecomputedExtractor::new(VectorDimension::new(3).unwrap());

        let err = extractor
            .extract(&RawContent::Url("https://example.com/a.png".to_string()))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported { kind: "url", .. }));

        let err = extractor
            .extract(&RawContent::Embedding(vec![1.0]))
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Dimension {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_batch_keeps_input_order() {
        let extractor = PrecomputedExtractor::new(VectorDimension::new(1).unwrap());
        let results = extractor.extract_batch(&[
            RawContent::Embedding(vec![1.0]),
            RawContent::Text("no vector".to_string()),
            RawContent::Embedding(vec![3.0]),
        ]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap(), &vec![3.0]);
    }

    #[test]
    fn test_parse_embedding_model() {
        assert!(parse_embedding_model("AllMiniLML6V2").is_ok());
        assert!(matches!(
            parse_embedding_model("gpt-image"),
            Err(ExtractError::Model(_))
        ));
    }

    #[test]
    fn test_text_file_detection() {
        assert!(is_text_file(Path::new("notes/a.md")));
        assert!(is_text_file(Path::new("README.TXT")));
        assert!(!is_text_file(Path::new("photo.jpg")));
        assert!(!is_text_file(Path::new("Makefile")));
    }
}

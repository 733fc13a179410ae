//! Raw item loading.
//!
//! Loaders turn a source on disk into [`RawItem`]s: content to extract
//! features from, plus whatever identifying fields the source carried.
//!
//! Supported sources:
//! - a directory of image and text files
//! - a JSON catalog, either a bare list or an object wrapping one under
//!   `products`, `items` or `data`

use crate::error::{IoContext, VecdexError, VecdexResult};
use crate::metadata::{
    ImageRecord, MetadataRecord, SourceTag, TextChunkRecord, filename_from_location,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];
const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

/// Keys under which a JSON catalog object may wrap its item list.
const WRAPPER_KEYS: &[&str] = &["products", "items", "data"];

/// Content handed to a feature extractor.
#[derive(Debug, Clone, PartialEq)]
pub enum RawContent {
    Text(String),
    Path(PathBuf),
    Url(String),
    /// A vector computed elsewhere.
    Embedding(Vec<f32>),
}

impl RawContent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Path(_) => "path",
            Self::Url(_) => "url",
            Self::Embedding(_) => "embedding",
        }
    }
}

/// One item to index.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub content: RawContent,
    pub external_id: Option<String>,
    pub title: Option<String>,
    /// Text attached to an item whose content is not itself text.
    pub text: Option<String>,
    /// Path or URL the item came from.
    pub location: Option<String>,
    pub source: SourceTag,
}

impl RawItem {
    #[must_use]
    pub fn new(content: RawContent, source: SourceTag) -> Self {
        Self {
            content,
            external_id: None,
            title: None,
            text: None,
            location: None,
            source,
        }
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(RawContent::Text(text.into()), SourceTag::Inline)
    }

    #[must_use]
    pub fn embedding(vector: Vec<f32>) -> Self {
        Self::new(RawContent::Embedding(vector), SourceTag::Inline)
    }

    #[must_use]
    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Identifies the item in logs and skip reports.
    #[must_use]
    pub fn label(&self) -> String {
        if let Some(location) = &self.location {
            return location.clone();
        }
        if let Some(id) = &self.external_id {
            return format!("id {id}");
        }
        match &self.content {
            RawContent::Path(p) => p.display().to_string(),
            RawContent::Url(u) => u.clone(),
            other => format!("{} item", other.kind()),
        }
    }

    /// The side-table record for this item.
    ///
    /// Files and URLs become image records, as do embeddings whose location
    /// names an image, even when the entry also carries text.
    #[must_use]
    pub fn to_record(&self, indexed_at: DateTime<Utc>) -> MetadataRecord {
        let text = match &self.content {
            RawContent::Text(text) => Some(text.clone()),
            RawContent::Embedding(_) if !self.has_image_location() => self.text.clone(),
            RawContent::Embedding(_) | RawContent::Path(_) | RawContent::Url(_) => None,
        };

        if let Some(text) = text {
            return MetadataRecord::TextChunk(TextChunkRecord {
                text,
                source_file: self.location.clone(),
                external_id: self.external_id.clone(),
                title: self.title.clone(),
                indexed_at,
                source: self.source,
            });
        }

        let path = match &self.content {
            RawContent::Path(p) => p.display().to_string(),
            RawContent::Url(u) => u.clone(),
            _ => self.location.clone().unwrap_or_default(),
        };
        MetadataRecord::Image(ImageRecord {
            filename: filename_from_location(&path),
            path,
            external_id: self.external_id.clone(),
            title: self.title.clone(),
            indexed_at,
            source: self.source,
        })
    }

    fn has_image_location(&self) -> bool {
        self.location
            .as_deref()
            .is_some_and(|location| location.contains("://") || is_image_file(location))
    }
}

/// Options for reading a JSON catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonSourceOptions {
    /// Field holding the image URL. `image` is tried as a fallback.
    pub url_key: String,
    /// Read at most this many entries.
    pub max_items: Option<usize>,
}

impl Default for JsonSourceOptions {
    fn default() -> Self {
        Self {
            url_key: "image".to_string(),
            max_items: None,
        }
    }
}

/// Loads items from a directory or a JSON catalog file.
pub fn load_raw_items(source: &Path, options: &JsonSourceOptions) -> VecdexResult<Vec<RawItem>> {
    if source.is_dir() {
        return load_directory_items(source);
    }
    if !source.is_file() {
        return Err(VecdexError::Io {
            path: source.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "source does not exist"),
        });
    }

    match extension_of(source).as_deref() {
        Some("json") => load_json_items(source, options),
        Some(ext) if TEXT_EXTENSIONS.contains(&ext) => {
            let text = std::fs::read_to_string(source).with_path(source)?;
            let mut item = RawItem::new(RawContent::Text(text), SourceTag::Documents)
                .with_location(source.display().to_string());
            item.title = source.file_name().map(|n| n.to_string_lossy().into_owned());
            Ok(vec![item])
        }
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => Ok(vec![
            RawItem::new(RawContent::Path(source.to_path_buf()), SourceTag::Directory)
                .with_location(source.display().to_string()),
        ]),
        _ => Err(VecdexError::InvalidParameter {
            name: "source",
            value: source.display().to_string(),
            reason: "expected a directory, a .json catalog, or an image or text file",
        }),
    }
}

/// Lists image and text files directly inside `dir`, sorted by path.
///
/// Text files are read eagerly; unreadable ones are skipped with a warning.
pub fn load_directory_items(dir: &Path) -> VecdexResult<Vec<RawItem>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_path(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut items = Vec::new();
    for path in paths {
        let Some(ext) = extension_of(&path) else {
            continue;
        };
        let location = path.display().to_string();

        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            items.push(
                RawItem::new(RawContent::Path(path), SourceTag::Directory).with_location(location),
            );
        } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            match std::fs::read_to_string(&path) {
                Ok(text) => items.push(
                    RawItem::new(RawContent::Text(text), SourceTag::Documents)
                        .with_location(location),
                ),
                Err(e) => {
                    tracing::warn!(target: "vecdex::source", "skipping {location}: {e}");
                }
            }
        }
    }

    tracing::debug!(
        target: "vecdex::source",
        "found {} items in {}",
        items.len(),
        dir.display()
    );
    Ok(items)
}

/// Reads a JSON catalog file.
pub fn load_json_items(path: &Path, options: &JsonSourceOptions) -> VecdexResult<Vec<RawItem>> {
    let bytes = std::fs::read(path).with_path(path)?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| VecdexError::Serialization {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_json_items(&value, options).map_err(|reason| VecdexError::Serialization {
        path: path.to_path_buf(),
        reason,
    })
}

/// Extracts items from an already-parsed JSON catalog.
///
/// Entries without usable content are skipped with a warning.
pub fn parse_json_items(value: &Value, options: &JsonSourceOptions) -> Result<Vec<RawItem>, String> {
    let entries = find_item_list(value)
        .ok_or_else(|| "no list of items found in JSON catalog".to_string())?;
    if entries.is_empty() {
        return Err("no entries found in JSON catalog to index".to_string());
    }

    let limit = options.max_items.unwrap_or(usize::MAX);
    let mut items = Vec::new();
    for (position, entry) in entries.iter().take(limit).enumerate() {
        match parse_entry(entry, &options.url_key) {
            Some(item) => items.push(item),
            None => tracing::warn!(
                target: "vecdex::source",
                "skipping catalog entry {position}: no url, text or embedding"
            ),
        }
    }
    Ok(items)
}

fn find_item_list(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(list) => Some(list),
        Value::Object(map) => WRAPPER_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .or_else(|| map.values().find_map(Value::as_array)),
        _ => None,
    }
}

fn parse_entry(entry: &Value, url_key: &str) -> Option<RawItem> {
    match entry {
        Value::String(location) if !location.trim().is_empty() => {
            Some(location_item(location.trim()))
        }
        Value::Object(map) => {
            let string_field = |key: &str| {
                map.get(key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };

            let location = string_field(url_key).or_else(|| string_field("image"));
            let text = string_field("text");
            let embedding = map.get("embedding").and_then(parse_embedding);

            let mut item = match (embedding, &location, &text) {
                (Some(vector), _, _) => {
                    let source = if location.is_some() {
                        SourceTag::UrlJson
                    } else {
                        SourceTag::Inline
                    };
                    RawItem::new(RawContent::Embedding(vector), source)
                }
                (None, Some(location), _) => location_item(location),
                (None, None, Some(text)) => {
                    RawItem::new(RawContent::Text(text.clone()), SourceTag::Inline)
                }
                (None, None, None) => return None,
            };

            item.location = location;
            item.text = item.text.or(text);
            item.title = string_field("title");
            item.external_id = map.get("id").and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
            Some(item)
        }
        _ => None,
    }
}

fn location_item(location: &str) -> RawItem {
    let content = if location.contains("://") {
        RawContent::Url(location.to_string())
    } else {
        RawContent::Path(PathBuf::from(location))
    };
    RawItem::new(content, SourceTag::UrlJson).with_location(location)
}

fn parse_embedding(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

fn is_image_file(location: &str) -> bool {
    extension_of(Path::new(&filename_from_location(location)))
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

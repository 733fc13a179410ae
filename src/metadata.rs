//! Metadata side-table attached 1:1 to index ordinals.
//!
//! Each stored vector has exactly one [`MetadataRecord`]. On disk the table
//! is a JSON object keyed by the decimal ordinal, so `"0"` describes the
//! first vector ever inserted.

use crate::error::{VecdexError, VecdexResult};
use crate::vector::{Ordinal, OrdinalRange};
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Where a record's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Files found by scanning a local directory.
    Directory,
    /// Entries of a JSON product catalog pointing at remote images.
    UrlJson,
    /// Chunks of text documents.
    Documents,
    /// Items supplied directly by a caller.
    Inline,
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Directory => "directory",
            Self::UrlJson => "url_json",
            Self::Documents => "documents",
            Self::Inline => "inline",
        };
        f.write_str(tag)
    }
}

/// Descriptive record for an indexed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Local path or remote URL of the image.
    pub path: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub indexed_at: DateTime<Utc>,
    pub source: SourceTag,
}

/// Descriptive record for an indexed text chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunkRecord {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub indexed_at: DateTime<Utc>,
    pub source: SourceTag,
}

/// One side-table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetadataRecord {
    Image(ImageRecord),
    TextChunk(TextChunkRecord),
}

impl MetadataRecord {
    #[must_use]
    pub fn external_id(&self) -> Option<&str> {
        match self {
            Self::Image(r) => r.external_id.as_deref(),
            Self::TextChunk(r) => r.external_id.as_deref(),
        }
    }

    #[must_use]
    pub fn source(&self) -> SourceTag {
        match self {
            Self::Image(r) => r.source,
            Self::TextChunk(r) => r.source,
        }
    }

    #[must_use]
    pub fn indexed_at(&self) -> DateTime<Utc> {
        match self {
            Self::Image(r) => r.indexed_at,
            Self::TextChunk(r) => r.indexed_at,
        }
    }

    /// Short human-readable name: the title if there is one, otherwise the
    /// filename for images and a text preview for chunks.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Image(r) => r.title.clone().unwrap_or_else(|| r.filename.clone()),
            Self::TextChunk(r) => r.title.clone().unwrap_or_else(|| preview(&r.text, 60)),
        }
    }

    /// Path, URL or source file, if any.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Image(r) => Some(&r.path),
            Self::TextChunk(r) => r.source_file.as_deref(),
        }
    }
}

/// Last path or URL segment, without query string or fragment.
#[must_use]
pub fn filename_from_location(location: &str) -> String {
    let trimmed = location
        .split(['?', '#'])
        .next()
        .unwrap_or(location)
        .trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

/// Ordinal-keyed side-table.
///
/// Records are stored densely, so the record for ordinal `i` lives at
/// position `i`. Its length must equal the index's vector count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTable {
    records: Vec<MetadataRecord>,
}

impl MetadataTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, ordinal: Ordinal) -> Option<&MetadataRecord> {
        self.records.get(ordinal.as_index())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Ordinal, &MetadataRecord)> + '_ {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| (Ordinal::new(i as u32), r))
    }

    /// Appends the records for a freshly assigned ordinal range.
    pub fn append(&mut self, range: OrdinalRange, records: Vec<MetadataRecord>) -> VecdexResult<()> {
        if range.start.as_index() != self.records.len() || range.len() != records.len() {
            return Err(VecdexError::CorruptMetadata {
                reason: format!(
                    "ordinals {}..{} do not follow a table of {} records",
                    range.start,
                    range.end,
                    self.records.len()
                ),
            });
        }
        self.records.extend(records);
        Ok(())
    }

    /// Fails with `CorruptMetadata` unless the table covers `vector_count` ordinals.
    pub fn ensure_consistent(&self, vector_count: usize) -> VecdexResult<()> {
        if self.records.len() != vector_count {
            return Err(VecdexError::CorruptMetadata {
                reason: format!(
                    "index holds {vector_count} vectors but the side-table has {} records",
                    self.records.len()
                ),
            });
        }
        Ok(())
    }

    /// Builds a table from string ordinal keys, which must be exactly `0..n`.
    pub fn from_keyed(keyed: HashMap<String, MetadataRecord>) -> Result<Self, String> {
        let mut entries = keyed
            .into_iter()
            .map(|(key, record)| {
                key.parse::<u32>()
                    .map(|ordinal| (ordinal, record))
                    .map_err(|_| format!("side-table key '{key}' is not an ordinal"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|(ordinal, _)| *ordinal);

        for (expected, (ordinal, _)) in entries.iter().enumerate() {
            if *ordinal as usize != expected {
                return Err(format!("side-table is missing ordinal {expected}"));
            }
        }

        Ok(Self {
            records: entries.into_iter().map(|(_, r)| r).collect(),
        })
    }
}

impl From<Vec<MetadataRecord>> for MetadataTable {
    fn from(records: Vec<MetadataRecord>) -> Self {
        Self { records }
    }
}

impl Serialize for MetadataTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.records.len()))?;
        for (ordinal, record) in self.iter() {
            map.serialize_entry(&ordinal.key(), record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MetadataTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let keyed = HashMap::<String, MetadataRecord>::deserialize(deserializer)?;
        Self::from_keyed(keyed).map_err(D::Error::custom)
    }
}

//! Prompt metadata reading and writing.
//!
//! This module provides the two halves of the metadata transfer:
//!
//! - [`read_png_metadata`]: pull `prompt`, `workflow` and `extra_pnginfo` out of PNG text chunks
//! - [`embed_metadata`]: store them in the EXIF chunk of an encoded WEBP
//!
//! [`read_webp_metadata`] reads the WEBP side back, using the same EXIF layout
//! ComfyUI uses for its own WEBP output (`"key:value"` strings in IFD0 tags).

mod reader;
mod writer;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use reader::{
    WebpMetadata, png_metadata_from_bytes, read_png_metadata, read_webp_metadata,
    webp_metadata_from_bytes,
};
pub use writer::{ExtraLayout, embed_metadata};

pub(crate) use reader::read_file;

/// The text fields carried from PNG to WEBP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKey {
    Prompt,
    Workflow,
    ExtraPngInfo,
}

impl MetadataKey {
    pub const ALL: [MetadataKey; 3] = [Self::Prompt, Self::Workflow, Self::ExtraPngInfo];

    /// The PNG keyword (and WEBP entry prefix) for this key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Workflow => "workflow",
            Self::ExtraPngInfo => "extra_pnginfo",
        }
    }

    /// Match a PNG keyword. Keywords are case-sensitive.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == keyword)
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognized metadata of one image. Only keys that were present are stored,
/// and values are kept verbatim (JSON is never re-serialized).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromptMetadata {
    entries: BTreeMap<MetadataKey, String>,
}

impl PromptMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: MetadataKey) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    /// Set a value, replacing any earlier one for the same key.
    pub fn insert(&mut self, key: MetadataKey, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key, value.into())
    }

    pub fn contains(&self, key: MetadataKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Present keys, in `prompt`, `workflow`, `extra_pnginfo` order.
    pub fn keys(&self) -> impl Iterator<Item = MetadataKey> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetadataKey, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

//! Crate-wide defaults, loaded from an optional on-disk file with a
//! tolerant-load fallback: any read or parse error silently yields
//! [`VectraConfig::default()`] rather than surfacing an error, matching the
//! teacher's own config layer.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default chunking, query, and index-file settings shared by
/// [`crate::text_splitter`], [`crate::document_index`], and
/// [`crate::vector_index`] unless a caller overrides them explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectraConfig {
    /// Default `chunk_size` (tokens) for [`crate::text_splitter::TextSplitterConfig`].
    pub chunk_size: usize,
    /// Default `chunk_overlap` (tokens).
    pub chunk_overlap: usize,
    /// Default `keep_separators` behavior.
    pub keep_separators: bool,
    /// Default `max_documents` for [`crate::document_index::DocumentQueryOptions`].
    pub max_documents: usize,
    /// Default `max_chunks` for the same.
    pub max_chunks: usize,
    /// Default index filename inside an index folder.
    pub index_file_name: String,
}

impl Default for VectraConfig {
    fn default() -> Self {
        Self {
            chunk_size: 400,
            chunk_overlap: 40,
            keep_separators: false,
            max_documents: 10,
            max_chunks: 50,
            index_file_name: "index.json".to_string(),
        }
    }
}

/// Loads `.vectraindex.json` alongside `folder`, falling back silently to
/// [`VectraConfig::default()`] on any I/O or parse error.
pub fn load_config(folder: &Path) -> VectraConfig {
    let path = folder.join(".vectraindex.json");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return VectraConfig::default();
    };
    serde_json::from_str(&text).unwrap_or_else(|_| VectraConfig::default())
}

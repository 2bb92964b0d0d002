//! Chunking of file content for retrieval.
//!
//! Two strategies produce chunks:
//! - a grammar-aware splitter that cuts along declarations (tree-sitter)
//! - a separator-cascade splitter used for everything else and as a second
//!   pass over oversized declarations
//!
//! The pipeline picks the strategy through a capability lookup on the
//! file's language; an unknown language simply means "use the fallback".

mod detection;
mod pipeline;
pub mod splitters;

pub use detection::Language;
pub use pipeline::{ChunkConfig, ChunkPipeline};

use serde::{Deserialize, Serialize};

/// A bounded, ordered slice of a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,

    /// Byte range in the analyzed content
    pub byte_range: (usize, usize),
}

impl Chunk {
    pub(crate) fn from_range(source: &str, start: usize, end: usize) -> Self {
        Self {
            text: source[start..end].to_string(),
            byte_range: (start, end),
        }
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

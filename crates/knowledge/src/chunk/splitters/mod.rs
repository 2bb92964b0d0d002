//! Splitter implementations.

mod code;
mod fallback;

pub use code::CodeSplitter;
pub use fallback::FallbackSplitter;

use crate::chunk::Chunk;

/// A chunking strategy.
pub trait ChunkSplitter: Send + Sync {
    /// Split `text` into ordered, non-empty chunks.
    ///
    /// `None` means the strategy does not apply to this input and the caller
    /// should route it to the fallback.
    fn split(&self, text: &str) -> Option<Vec<Chunk>>;
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

//! Grammar-aware splitter using tree-sitter.
//!
//! Collects split-unit nodes (functions, classes, impls...) at most
//! `MAX_DEPTH` levels below the root without descending into a match, then
//! emits the trimmed gaps between matches and each match in source order.
//! Chunks larger than 1.2x the cap go through the fallback splitter.

use super::{char_len, ChunkSplitter, FallbackSplitter};
use crate::chunk::{Chunk, Language};
use tree_sitter::{Node, Parser};

const MAX_DEPTH: usize = 4;
const OVERSIZE_FACTOR: f64 = 1.2;

pub struct CodeSplitter {
    language: Language,
    chunk_size: usize,
    fallback: FallbackSplitter,
}

impl CodeSplitter {
    pub fn new(language: Language, chunk_size: usize, overlap: usize) -> Self {
        Self {
            language,
            chunk_size,
            fallback: FallbackSplitter::new(chunk_size, overlap),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Byte ranges of split-unit nodes, sorted by start offset.
    fn unit_ranges(&self, text: &str) -> Option<Vec<(usize, usize)>> {
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&self.language.grammar()) {
            tracing::debug!("Grammar for {} unavailable: {}", self.language.name(), e);
            return None;
        }
        let tree = parser.parse(text, None)?;

        let mut ranges = Vec::new();
        collect_units(tree.root_node(), self.language.split_units(), 0, &mut ranges);
        ranges.sort_by_key(|range| range.0);
        Some(ranges)
    }

    fn push_trimmed(&self, text: &str, start: usize, end: usize, out: &mut Vec<Chunk>) {
        let (start, end) = trim_range(text, start, end);
        if start == end {
            return;
        }
        let limit = self.chunk_size as f64 * OVERSIZE_FACTOR;
        if char_len(&text[start..end]) as f64 > limit {
            for (sub_start, sub_end) in self.fallback.split_ranges(&text[start..end]) {
                out.push(Chunk::from_range(text, start + sub_start, start + sub_end));
            }
        } else {
            out.push(Chunk::from_range(text, start, end));
        }
    }
}

impl ChunkSplitter for CodeSplitter {
    fn split(&self, text: &str) -> Option<Vec<Chunk>> {
        let ranges = self.unit_ranges(text)?;
        if ranges.is_empty() {
            tracing::debug!("No split units found for {}", self.language.name());
            return None;
        }

        let mut chunks = Vec::new();
        let mut cursor = 0usize;
        for (start, end) in ranges {
            if start < cursor {
                continue;
            }
            self.push_trimmed(text, cursor, start, &mut chunks);
            self.push_trimmed(text, start, end, &mut chunks);
            cursor = end;
        }
        self.push_trimmed(text, cursor, text.len(), &mut chunks);

        tracing::debug!(
            "Code splitter ({}) created {} chunks from {} bytes",
            self.language.name(),
            chunks.len(),
            text.len()
        );
        Some(chunks)
    }
}

fn collect_units(node: Node, units: &[&str], depth: usize, out: &mut Vec<(usize, usize)>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if units.contains(&child.kind()) {
            out.push((child.start_byte(), child.end_byte()));
        } else if depth + 1 < MAX_DEPTH {
            collect_units(child, units, depth + 1, out);
        }
    }
}

fn trim_range(text: &str, start: usize, end: usize) -> (usize, usize) {
    let slice = &text[start..end];
    let trimmed_start = slice.trim_start();
    if trimmed_start.is_empty() {
        return (start, start);
    }
    let lead = slice.len() - trimmed_start.len();
    let trail = trimmed_start.len() - trimmed_start.trim_end().len();
    (start + lead, end - trail)
}

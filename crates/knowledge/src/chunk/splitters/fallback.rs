//! Separator-cascade splitter.
//!
//! Splits on paragraph breaks, then line breaks, then spaces. Pieces keep
//! their trailing separator, so the produced ranges are contiguous and cover
//! the input. A piece still over the cap after the space level is cut into
//! fixed windows of `chunk_size` characters with stride
//! `chunk_size - overlap`; only those windows overlap.

use super::{char_len, ChunkSplitter};
use crate::chunk::Chunk;

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone)]
pub struct FallbackSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl FallbackSplitter {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    /// Split into chunks. Whitespace-only input yields no chunks.
    pub fn split_text(&self, text: &str) -> Vec<Chunk> {
        self.split_ranges(text)
            .into_iter()
            .map(|(start, end)| Chunk::from_range(text, start, end))
            .collect()
    }

    /// Byte ranges of the chunks, in order.
    pub fn split_ranges(&self, text: &str) -> Vec<(usize, usize)> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let mut ranges = Vec::new();
        self.split_level(text, 0, text.len(), 0, &mut ranges);
        self.absorb_whitespace(text, ranges)
    }

    fn split_level(
        &self,
        text: &str,
        start: usize,
        end: usize,
        level: usize,
        out: &mut Vec<(usize, usize)>,
    ) {
        if char_len(&text[start..end]) <= self.chunk_size {
            out.push((start, end));
            return;
        }
        let Some(separator) = SEPARATORS.get(level) else {
            self.force_windows(text, start, end, out);
            return;
        };

        let mut current: Option<(usize, usize)> = None;
        let mut current_len = 0usize;
        for (piece_start, piece_end) in pieces(text, start, end, separator) {
            let piece_len = char_len(&text[piece_start..piece_end]);
            if piece_len > self.chunk_size {
                if let Some(range) = current.take() {
                    out.push(range);
                }
                self.split_level(text, piece_start, piece_end, level + 1, out);
                continue;
            }
            match current {
                Some((current_start, _)) if current_len + piece_len <= self.chunk_size => {
                    current = Some((current_start, piece_end));
                    current_len += piece_len;
                }
                _ => {
                    if let Some(range) = current.take() {
                        out.push(range);
                    }
                    current = Some((piece_start, piece_end));
                    current_len = piece_len;
                }
            }
        }
        if let Some(range) = current {
            out.push(range);
        }
    }

    fn force_windows(&self, text: &str, start: usize, end: usize, out: &mut Vec<(usize, usize)>) {
        let bounds: Vec<usize> = text[start..end]
            .char_indices()
            .map(|(offset, _)| start + offset)
            .chain(std::iter::once(end))
            .collect();
        let total = bounds.len() - 1;
        let stride = self.chunk_size - self.overlap;

        let mut window_start = 0usize;
        loop {
            let window_end = (window_start + self.chunk_size).min(total);
            out.push((bounds[window_start], bounds[window_end]));
            if window_end == total {
                break;
            }
            window_start += stride;
        }
    }

    /// Fold whitespace-only ranges into their neighbours.
    ///
    /// A whitespace run first tops up the previous range to the cap, then
    /// prefixes the next range if that fits; whatever is left stays a range
    /// of its own. No byte is dropped.
    fn absorb_whitespace(&self, text: &str, ranges: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
        let mut out: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
        let mut pending: Option<(usize, usize)> = None;

        for (start, end) in ranges {
            if text[start..end].trim().is_empty() {
                pending = match pending {
                    Some((pending_start, pending_end))
                        if pending_end == start
                            && char_len(&text[pending_start..end]) <= self.chunk_size =>
                    {
                        Some((pending_start, end))
                    }
                    Some(whitespace) => {
                        self.flush_whitespace(text, &mut out, whitespace);
                        Some((start, end))
                    }
                    None => Some((start, end)),
                };
                continue;
            }

            let mut start = start;
            if let Some(whitespace) = pending.take() {
                if let Some((rest_start, rest_end)) = self.top_up_previous(text, &mut out, whitespace) {
                    if rest_end == start && char_len(&text[rest_start..end]) <= self.chunk_size {
                        start = rest_start;
                    } else {
                        out.push((rest_start, rest_end));
                    }
                }
            }
            out.push((start, end));
        }
        if let Some(whitespace) = pending {
            self.flush_whitespace(text, &mut out, whitespace);
        }
        out
    }

    fn flush_whitespace(&self, text: &str, out: &mut Vec<(usize, usize)>, whitespace: (usize, usize)) {
        if let Some(rest) = self.top_up_previous(text, out, whitespace) {
            out.push(rest);
        }
    }

    /// Extend the last range with as much of `whitespace` as the cap allows.
    /// Returns the part that did not fit.
    fn top_up_previous(
        &self,
        text: &str,
        out: &mut [(usize, usize)],
        whitespace: (usize, usize),
    ) -> Option<(usize, usize)> {
        let (ws_start, ws_end) = whitespace;
        let Some(last) = out.last_mut() else {
            return Some(whitespace);
        };
        if last.1 != ws_start {
            return Some(whitespace);
        }
        let room = self.chunk_size.saturating_sub(char_len(&text[last.0..last.1]));
        let split = text[ws_start..ws_end]
            .char_indices()
            .nth(room)
            .map(|(offset, _)| ws_start + offset)
            .unwrap_or(ws_end);
        last.1 = split;
        (split < ws_end).then_some((split, ws_end))
    }
}

impl ChunkSplitter for FallbackSplitter {
    fn split(&self, text: &str) -> Option<Vec<Chunk>> {
        Some(self.split_text(text))
    }
}

/// Split `text[start..end]` after each occurrence of `separator`.
fn pieces(text: &str, start: usize, end: usize, separator: &str) -> Vec<(usize, usize)> {
    let slice = &text[start..end];
    let mut out = Vec::new();
    let mut piece_start = 0usize;
    for (offset, matched) in slice.match_indices(separator) {
        let piece_end = offset + matched.len();
        if piece_end > piece_start {
            out.push((start + piece_start, start + piece_end));
            piece_start = piece_end;
        }
    }
    if piece_start < slice.len() {
        out.push((start + piece_start, end));
    }
    out
}

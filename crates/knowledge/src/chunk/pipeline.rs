//! Chunking pipeline orchestrator.

use super::{
    detection::Language,
    splitters::{ChunkSplitter, CodeSplitter, FallbackSplitter},
    Chunk,
};
use codepilot_core::AnalysisSettings;

/// Configuration for the chunking pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,

    /// Overlap between forced windows in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 150,
        }
    }
}

impl From<&AnalysisSettings> for ChunkConfig {
    fn from(settings: &AnalysisSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
        }
    }
}

/// Strategy selection plus the universal fallback.
pub struct ChunkPipeline {
    config: ChunkConfig,
    fallback: FallbackSplitter,
}

impl ChunkPipeline {
    pub fn new(config: ChunkConfig) -> Self {
        let fallback = FallbackSplitter::new(config.chunk_size, config.chunk_overlap);
        Self { config, fallback }
    }

    /// Grammar-aware strategy for a language, if one is configured.
    pub fn strategy_for(&self, language: Option<Language>) -> Option<Box<dyn ChunkSplitter>> {
        let language = language?;
        Some(Box::new(CodeSplitter::new(
            language,
            self.config.chunk_size,
            self.config.chunk_overlap,
        )))
    }

    /// Split text into ordered chunks. Empty input yields no chunks.
    pub fn split(&self, text: &str, language_hint: Option<Language>) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chunks = self
            .strategy_for(language_hint)
            .and_then(|strategy| strategy.split(text))
            .unwrap_or_else(|| self.fallback.split_text(text));

        tracing::debug!(
            "Chunking complete: {} chunks from {} bytes (language: {})",
            chunks.len(),
            text.len(),
            language_hint.map(|l| l.name()).unwrap_or("none")
        );
        chunks
    }

    /// Split using the language detected from `file_path`.
    pub fn split_file(&self, file_path: &str, text: &str) -> Vec<Chunk> {
        self.split(text, Language::from_path(file_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let pipeline = ChunkPipeline::new(ChunkConfig::default());
        assert!(pipeline.split("", Some(Language::Rust)).is_empty());
        assert!(pipeline.split_file("notes.md", "\n\n").is_empty());
    }

    #[test]
    fn test_unknown_language_uses_fallback() {
        let pipeline = ChunkPipeline::new(ChunkConfig::default());
        assert!(pipeline.strategy_for(None).is_none());

        let text = "# Title\n\nSome prose.\n";
        let chunks = pipeline.split_file("README.md", text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_python_body_without_matches_is_windowed() {
        let pipeline = ChunkPipeline::new(ChunkConfig::default());
        let body = "total=total+compute(index,offset);".repeat(50);
        let text = &body[..1500];

        let chunks = pipeline.split(text, Some(Language::Python));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].byte_range, (0, 1000));
        assert_eq!(chunks[1].byte_range.0, 850);
    }

    #[test]
    fn test_rust_code_is_split_by_declaration() {
        let pipeline = ChunkPipeline::new(ChunkConfig::default());
        let code = "fn main() {\n    run();\n}\n\nfn run() {\n    println!(\"hi\");\n}\n";

        let chunks = pipeline.split_file("src/main.rs", code);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.starts_with("fn main"));
        assert!(chunks[1].text.starts_with("fn run"));
    }

    #[test]
    fn test_settings_conversion() {
        let settings = AnalysisSettings {
            chunk_size: 400,
            chunk_overlap: 40,
            ..AnalysisSettings::default()
        };
        let config = ChunkConfig::from(&settings);
        assert_eq!(config.chunk_size, 400);
        assert_eq!(config.chunk_overlap, 40);
    }
}

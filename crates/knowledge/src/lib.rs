//! Project context engine.
//!
//! Reads a project from a local directory or a GitHub repository, turns
//! every file into context items (summary, structure, chunks with
//! embeddings), persists them in SQLite and answers questions over them:
//! - `analysis`: per-file pipeline and the background analysis worker
//! - `retrieval`: cosine ranking of chunks against a question
//! - `session`: prompt assembly, the interactive worker and file requests
//! - `updater`: incremental refresh of files changed in the working tree
//! - `store`: persisted snapshot of context, history and metadata

pub mod analysis;
pub mod chunk;
pub mod context;
pub mod embeddings;
pub mod progress;
pub mod reader;
pub mod retrieval;
pub mod session;
pub mod store;
pub mod structure;
pub mod types;
pub mod updater;

// Re-export commonly used types
pub use analysis::{AnalysisHandle, AnalysisOptions, AnalysisPipeline, AnalysisWorker, FileOutcome};
pub use context::{context_blocks, ContextMode, ProjectContext};
pub use embeddings::{create_provider, EmbeddingProvider, EmbeddingSettings, EmbeddingTask};
pub use progress::{AnalysisEvent, AnalysisReport, EventSink, InteractiveEvent, ProgressEvent};
pub use reader::{read_text, render_file_tree, ContentSource, GitHubSource, ListingRules, LocalSource};
pub use retrieval::{cosine_similarity, Retrieval, RetrievalEngine};
pub use session::{ChatSession, InteractiveHandle, SessionOptions, MAX_FILE_REQUESTS};
pub use store::{ContextStore, ProjectMetadata, Snapshot};
pub use structure::StructureExtractor;
pub use types::{ContextItem, ContextStats, FileStructure, ItemContent, ItemKind};
pub use updater::{GitWorkingTree, IncrementalUpdater, UpdateReport, VersionControl};

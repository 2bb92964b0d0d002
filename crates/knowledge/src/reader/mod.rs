//! Content sources and decoding.
//!
//! A [`ContentSource`] lists the analyzable files of a project and returns
//! raw bytes for one of them; [`read_text`] adds document decoding on top.

mod documents;
mod github;
mod local;
mod tree;

pub use documents::decode_content;
pub use github::{GitHubSource, DEFAULT_GITHUB_API};
pub use local::LocalSource;
pub use tree::render_file_tree;

use codepilot_core::{AnalysisSettings, AppResult};

/// Where project files come from.
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    /// Human-readable origin (directory or `owner/repo@ref`).
    fn describe(&self) -> String;

    /// Analyzable files, relative to the project root with `/` separators.
    async fn list_files(&self) -> AppResult<Vec<String>>;

    /// Raw bytes of one file; `AppError::NotFound` when it does not exist.
    async fn read(&self, file_path: &str) -> AppResult<Vec<u8>>;
}

/// Read a file and decode it to text.
pub async fn read_text(source: &dyn ContentSource, file_path: &str) -> AppResult<String> {
    let bytes = source.read(file_path).await?;
    decode_content(file_path, &bytes)
}

/// Which files a listing keeps.
#[derive(Debug, Clone)]
pub struct ListingRules {
    pub extensions: Vec<String>,
    pub ignored_dirs: Vec<String>,
    pub max_file_bytes: u64,
}

impl ListingRules {
    pub fn allows_file(&self, path: &str, size: u64) -> bool {
        if size > self.max_file_bytes {
            return false;
        }
        let lower = path.to_lowercase();
        self.extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_lowercase()))
    }

    pub fn ignores_dir(&self, name: &str) -> bool {
        self.ignored_dirs.iter().any(|dir| dir == name)
    }

    /// Whether any directory component of `path` is ignored.
    pub fn ignores_path(&self, path: &str) -> bool {
        let mut components: Vec<&str> = path.split('/').collect();
        components.pop();
        components.iter().any(|c| self.ignores_dir(c))
    }
}

impl From<&AnalysisSettings> for ListingRules {
    fn from(settings: &AnalysisSettings) -> Self {
        Self {
            extensions: settings.extensions.clone(),
            ignored_dirs: settings.ignored_dirs.clone(),
            max_file_bytes: settings.max_file_size_kb * 1024,
        }
    }
}

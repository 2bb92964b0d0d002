//! Local filesystem source.

use super::{ContentSource, ListingRules};
use codepilot_core::{AppError, AppResult};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

pub struct LocalSource {
    root: PathBuf,
    rules: ListingRules,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>, rules: ListingRules) -> Self {
        Self {
            root: root.into(),
            rules,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a logical path, refusing anything that escapes the root.
    fn resolve(&self, file_path: &str) -> AppResult<PathBuf> {
        let relative = Path::new(file_path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(AppError::NotFound(file_path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl ContentSource for LocalSource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn list_files(&self) -> AppResult<Vec<String>> {
        let root = self.root.clone();
        let rules = self.rules.clone();

        let files = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            let walker = WalkDir::new(&root).into_iter().filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !rules.ignores_dir(&entry.file_name().to_string_lossy())
            });
            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!("Skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let logical = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let size = entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX);
                if rules.allows_file(&logical, size) {
                    files.push(logical);
                }
            }
            files.sort();
            files
        })
        .await
        .map_err(|e| AppError::Knowledge(format!("Listing task failed: {}", e)))?;

        tracing::debug!("Listed {} files under {}", files.len(), self.root.display());
        Ok(files)
    }

    async fn read(&self, file_path: &str) -> AppResult<Vec<u8>> {
        let path = self.resolve(file_path)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(file_path.to_string()))
            }
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codepilot_core::AnalysisSettings;
    use std::fs;
    use tempfile::TempDir;

    fn source(dir: &TempDir) -> LocalSource {
        LocalSource::new(dir.path(), ListingRules::from(&AnalysisSettings::default()))
    }

    #[tokio::test]
    async fn test_list_skips_ignored_dirs_and_extensions() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/lib")).unwrap();
        fs::write(dir.path().join("src/main.py"), "print(1)").unwrap();
        fs::write(dir.path().join("src/nested/util.rs"), "fn a() {}").unwrap();
        fs::write(dir.path().join("src/logo.png"), [0u8, 1, 2]).unwrap();
        fs::write(dir.path().join("node_modules/lib/index.js"), "x").unwrap();
        fs::write(dir.path().join("README.md"), "# hi").unwrap();

        let files = source(&dir).list_files().await.unwrap();
        assert_eq!(files, vec!["README.md", "src/main.py", "src/nested/util.rs"]);
    }

    #[tokio::test]
    async fn test_read_missing_and_escaping_paths() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let source = source(&dir);

        assert_eq!(source.read("a.txt").await.unwrap(), b"hello");
        assert!(matches!(source.read("b.txt").await, Err(AppError::NotFound(_))));
        assert!(matches!(
            source.read("../outside.txt").await,
            Err(AppError::NotFound(_))
        ));
    }
}

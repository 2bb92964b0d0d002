//! Re-analysis of files changed in the working tree.

use crate::analysis::AnalysisPipeline;
use crate::context::ProjectContext;
use crate::progress::{AnalysisEvent, EventSink};
use crate::reader::{ContentSource, ListingRules};
use codepilot_core::{AppError, AppResult};
use git2::{Repository, Status, StatusOptions};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Working-tree state, relative to the project root.
pub trait VersionControl: Send + Sync {
    /// Tracked files changed or deleted since the last commit.
    fn modified_paths(&self) -> AppResult<BTreeSet<String>>;

    /// Files not under version control.
    fn untracked_paths(&self) -> AppResult<BTreeSet<String>>;
}

/// Git working tree containing the project root.
pub struct GitWorkingTree {
    repo_root: PathBuf,
    /// Project root relative to the repository root, `/`-separated, may be empty
    prefix: String,
}

impl GitWorkingTree {
    /// Discover the repository that contains `project_root`.
    pub fn open(project_root: &Path) -> AppResult<Self> {
        let repo = Repository::discover(project_root)
            .map_err(|e| AppError::Vcs(format!("No git repository at {:?}: {}", project_root, e)))?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| AppError::Vcs("Repository has no working tree".to_string()))?;

        let workdir = workdir.canonicalize()?;
        let project_root = project_root.canonicalize()?;
        let prefix = project_root
            .strip_prefix(&workdir)
            .map_err(|_| AppError::Vcs(format!("{:?} is outside {:?}", project_root, workdir)))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        Ok(Self {
            repo_root: workdir,
            prefix,
        })
    }

    fn paths_with(&self, wanted: Status) -> AppResult<BTreeSet<String>> {
        let repo = Repository::open(&self.repo_root)
            .map_err(|e| AppError::Vcs(format!("Failed to open repository: {}", e)))?;

        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = repo
            .statuses(Some(&mut options))
            .map_err(|e| AppError::Vcs(format!("Failed to read status: {}", e)))?;

        let mut paths = BTreeSet::new();
        for entry in statuses.iter() {
            if !entry.status().intersects(wanted) {
                continue;
            }
            let Some(path) = entry.path() else {
                tracing::warn!("Skipping non UTF-8 path in git status");
                continue;
            };
            if let Some(relative) = self.relative(path) {
                paths.insert(relative);
            }
        }
        Ok(paths)
    }

    /// Path relative to the project root, if it lies inside it.
    fn relative(&self, repo_path: &str) -> Option<String> {
        if self.prefix.is_empty() {
            return Some(repo_path.to_string());
        }
        repo_path
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(str::to_string)
    }
}

impl VersionControl for GitWorkingTree {
    fn modified_paths(&self) -> AppResult<BTreeSet<String>> {
        self.paths_with(
            Status::WT_MODIFIED
                | Status::WT_DELETED
                | Status::WT_TYPECHANGE
                | Status::WT_RENAMED
                | Status::INDEX_NEW
                | Status::INDEX_MODIFIED
                | Status::INDEX_DELETED
                | Status::INDEX_RENAMED
                | Status::INDEX_TYPECHANGE,
        )
    }

    fn untracked_paths(&self) -> AppResult<BTreeSet<String>> {
        self.paths_with(Status::WT_NEW)
    }
}

/// Outcome of an incremental update.
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    /// Changed files that passed the allow-list
    pub changed_files: Vec<String>,

    /// Files whose items were rebuilt
    pub refreshed: Vec<String>,

    /// Items dropped before re-analysis
    pub removed_count: usize,

    /// Changed files that could not be read, deleted ones included
    pub errors: Vec<String>,

    /// Non-fatal notices for refreshed files
    pub warnings: Vec<String>,

    pub cancelled: bool,
}

pub struct IncrementalUpdater {
    pipeline: Arc<AnalysisPipeline>,
    rules: ListingRules,
}

impl IncrementalUpdater {
    pub fn new(pipeline: Arc<AnalysisPipeline>, rules: ListingRules) -> Self {
        Self { pipeline, rules }
    }

    /// Modified and untracked files that pass the allow-list.
    pub fn changed_files(&self, vcs: &dyn VersionControl) -> AppResult<BTreeSet<String>> {
        let mut changed = vcs.modified_paths()?;
        changed.extend(vcs.untracked_paths()?);
        changed.retain(|path| self.rules.allows_file(path, 0) && !self.rules.ignores_path(path));
        Ok(changed)
    }

    /// Drop the items of every changed file and analyze those files again.
    ///
    /// # Errors
    /// Version-control failures and fatal-batch errors. Files refreshed before
    /// a fatal error keep their new items.
    pub async fn update(
        &self,
        context: &mut ProjectContext,
        vcs: &dyn VersionControl,
        source: &dyn ContentSource,
        cancel: &CancellationToken,
    ) -> AppResult<UpdateReport> {
        let changed = self.changed_files(vcs)?;
        let files: Vec<String> = changed.iter().cloned().collect();
        let removed_count = context.remove_files(&changed);

        tracing::info!(
            "Incremental update: {} changed files, {} items removed",
            files.len(),
            removed_count
        );
        if files.is_empty() {
            return Ok(UpdateReport::default());
        }

        let (sink, mut rx) = EventSink::channel(16);
        let pipeline = &self.pipeline;
        let run_files = files.clone();
        let run = async move {
            let result = pipeline.run(source, &run_files, &sink, cancel).await;
            drop(sink);
            result
        };
        let apply = async {
            let mut messages: BTreeMap<String, Vec<String>> = BTreeMap::new();
            while let Some(event) = rx.recv().await {
                match event {
                    AnalysisEvent::FileAnalyzed { file_path, items } => {
                        context.replace_file(&file_path, items);
                    }
                    AnalysisEvent::Warning { file_path, message } => {
                        messages.entry(file_path).or_default().push(message);
                    }
                    _ => {}
                }
            }
            messages
        };
        let (result, mut messages) = tokio::join!(run, apply);
        let analysis = result?;

        let mut report = UpdateReport {
            changed_files: files,
            refreshed: analysis.analyzed.clone(),
            removed_count,
            cancelled: analysis.cancelled,
            ..UpdateReport::default()
        };
        for path in &analysis.skipped {
            for message in messages.remove(path).unwrap_or_default() {
                report.errors.push(format!("{}: {}", path, message));
            }
        }
        for (path, notices) in messages {
            for message in notices {
                report.warnings.push(format!("{}: {}", path, message));
            }
        }

        tracing::info!(
            "Incremental update refreshed {} files ({} errors)",
            report.refreshed.len(),
            report.errors.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::{options, MemorySource};
    use crate::types::{ContextItem, ItemKind};
    use codepilot_llm::MockClient;
    use git2::Signature;
    use tempfile::TempDir;

    struct FakeVcs {
        modified: Vec<&'static str>,
        untracked: Vec<&'static str>,
    }

    impl VersionControl for FakeVcs {
        fn modified_paths(&self) -> AppResult<BTreeSet<String>> {
            Ok(self.modified.iter().map(|s| s.to_string()).collect())
        }

        fn untracked_paths(&self) -> AppResult<BTreeSet<String>> {
            Ok(self.untracked.iter().map(|s| s.to_string()).collect())
        }
    }

    fn rules() -> ListingRules {
        ListingRules {
            extensions: vec![".py".to_string(), ".md".to_string()],
            ignored_dirs: vec!["venv".to_string()],
            max_file_bytes: 1024 * 1024,
        }
    }

    fn updater() -> IncrementalUpdater {
        let pipeline = AnalysisPipeline::new(options(true, false), Arc::new(MockClient::new()), None);
        IncrementalUpdater::new(Arc::new(pipeline), rules())
    }

    #[tokio::test]
    async fn test_changed_file_replaced_and_others_untouched() {
        let y_items = vec![
            ContextItem::summary("y.py", "Y summary"),
            ContextItem::chunk("y.py", 1, "y = 2", None),
        ];
        let mut items = vec![
            ContextItem::summary("x.py", "stale X summary"),
            ContextItem::chunk("x.py", 1, "x = 1", None),
        ];
        items.extend(y_items.clone());
        let mut context = ProjectContext::from_items(items);

        let vcs = FakeVcs {
            modified: vec!["x.py", "image.png"],
            untracked: vec![],
        };
        let source = MemorySource::new(&[("x.py", "x = 42\n"), ("y.py", "y = 2\n")]);
        let report = updater()
            .update(&mut context, &vcs, &source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.changed_files, vec!["x.py".to_string()]);
        assert_eq!(report.refreshed, vec!["x.py".to_string()]);
        assert_eq!(report.removed_count, 2);
        assert!(report.errors.is_empty());

        let x_items: Vec<&ContextItem> = context.items().iter().filter(|i| i.file_path == "x.py").collect();
        assert!(x_items.iter().all(|i| i.text() != Some("stale X summary")));
        assert!(x_items.iter().any(|i| i.kind == ItemKind::Summary
            && i.text() == Some("This file starts with `x = 42`.")));
        assert!(x_items
            .iter()
            .any(|i| i.kind == ItemKind::Chunk && i.text().map(str::trim) == Some("x = 42")));

        let y_now: Vec<ContextItem> = context
            .items()
            .iter()
            .filter(|i| i.file_path == "y.py")
            .cloned()
            .collect();
        assert_eq!(y_now, y_items);
    }

    #[tokio::test]
    async fn test_deleted_file_is_reported_as_error() {
        let mut context = ProjectContext::from_items(vec![ContextItem::summary("gone.py", "old")]);
        let vcs = FakeVcs {
            modified: vec!["gone.py"],
            untracked: vec!["new.md", "venv/lib.py"],
        };
        let source = MemorySource::new(&[("new.md", "# New\n")]);
        let report = updater()
            .update(&mut context, &vcs, &source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.changed_files, vec!["gone.py".to_string(), "new.md".to_string()]);
        assert_eq!(report.refreshed, vec!["new.md".to_string()]);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("gone.py: File not found"));
        assert_eq!(context.file_paths(), BTreeSet::from(["new.md".to_string()]));
    }

    fn commit_all(repo: &Repository) {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let signature = Signature::now("Test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &signature, &signature, "initial", &tree, &[])
            .unwrap();
    }

    #[test]
    fn test_git_working_tree_status() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::create_dir_all(dir.path().join("app")).unwrap();
        std::fs::write(dir.path().join("app/main.py"), "print(1)\n").unwrap();
        std::fs::write(dir.path().join("app/keep.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("app/old.py"), "y = 1\n").unwrap();
        std::fs::write(dir.path().join("top.py"), "z = 1\n").unwrap();
        commit_all(&repo);

        std::fs::write(dir.path().join("app/main.py"), "print(2)\n").unwrap();
        std::fs::remove_file(dir.path().join("app/old.py")).unwrap();
        std::fs::create_dir_all(dir.path().join("app/pkg")).unwrap();
        std::fs::write(dir.path().join("app/pkg/new.py"), "n = 1\n").unwrap();
        std::fs::write(dir.path().join("top.py"), "z = 2\n").unwrap();

        let tree = GitWorkingTree::open(&dir.path().join("app")).unwrap();
        assert_eq!(
            tree.modified_paths().unwrap(),
            BTreeSet::from(["main.py".to_string(), "old.py".to_string()])
        );
        assert_eq!(
            tree.untracked_paths().unwrap(),
            BTreeSet::from(["pkg/new.py".to_string()])
        );
    }

    #[test]
    fn test_open_outside_repository_fails() {
        let dir = TempDir::new().unwrap();
        // Temp dirs are normally outside any repository.
        if Repository::discover(dir.path()).is_ok() {
            return;
        }
        assert!(matches!(GitWorkingTree::open(dir.path()), Err(AppError::Vcs(_))));
    }
}

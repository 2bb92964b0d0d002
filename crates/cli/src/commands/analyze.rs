//! Analyze command handler.
//!
//! Runs the analysis worker over a local directory or a GitHub repository
//! and replaces the stored project context with the result.

use super::{cancel_on_interrupt, embedder, join_error, llm_client, open_store, print_json};
use chrono::Utc;
use clap::Args;
use codepilot_core::{config::AppConfig, AppError, AppResult};
use codepilot_knowledge::{
    render_file_tree, AnalysisEvent, AnalysisOptions, AnalysisPipeline, AnalysisReport,
    AnalysisWorker, ContentSource, GitHubSource, ListingRules, LocalSource, ProjectContext,
    ProjectMetadata, Snapshot,
};
use codepilot_prompt::ChatHistory;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Analyze a project into the context store
#[derive(Args, Debug)]
pub struct AnalyzeCommand {
    /// Local project directory (default: workspace)
    pub path: Option<PathBuf>,

    /// GitHub repository to analyze instead of a local directory
    #[arg(long, value_name = "OWNER/REPO", conflicts_with = "path")]
    pub remote: Option<String>,

    /// Branch, tag or commit of the remote repository
    #[arg(long = "ref", value_name = "REF", default_value = "main", requires = "remote")]
    pub git_ref: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AnalyzeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing analyze command");
        tracing::debug!("Analyze options: {:?}", self);

        let rules = ListingRules::from(&config.analysis);
        let (source, metadata): (Arc<dyn ContentSource>, ProjectMetadata) = match &self.remote {
            Some(repository) => {
                let source = GitHubSource::new(
                    repository,
                    self.git_ref.clone(),
                    config.github_token.clone(),
                    rules,
                    Duration::from_secs(config.analysis.request_timeout_secs),
                )?;
                let metadata = ProjectMetadata {
                    source: Some(repository.clone()),
                    git_ref: Some(self.git_ref.clone()),
                    ..ProjectMetadata::default()
                };
                (Arc::new(source), metadata)
            }
            None => {
                let root = self.local_root(config)?;
                let metadata = ProjectMetadata {
                    source: Some(root.to_string_lossy().into_owned()),
                    ..ProjectMetadata::default()
                };
                (Arc::new(LocalSource::new(root, rules)), metadata)
            }
        };

        eprintln!("Listing files in {}...", source.describe());
        let files = source.list_files().await?;
        if files.is_empty() {
            return Err(AppError::Knowledge(format!(
                "No analyzable files found in {}",
                source.describe()
            )));
        }
        let file_tree = render_file_tree(&project_name(metadata.source.as_deref()), &files);

        let pipeline = Arc::new(AnalysisPipeline::new(
            AnalysisOptions::from_config(config),
            llm_client(config)?,
            embedder(config)?,
        ));

        let mut handle = AnalysisWorker::spawn(pipeline, source, files, 32);
        cancel_on_interrupt(handle.cancel.clone());

        let mut context = ProjectContext::new();
        let mut outcome: Option<Result<AnalysisReport, AppError>> = None;
        while let Some(event) = handle.events.recv().await {
            match event {
                AnalysisEvent::Progress(progress) => {
                    if !self.json {
                        eprintln!("{}", progress.format_simple());
                    }
                }
                AnalysisEvent::FileAnalyzed { file_path, items } => {
                    context.replace_file(&file_path, items);
                }
                AnalysisEvent::Warning { file_path, message } => {
                    tracing::warn!("{}: {}", file_path, message);
                }
                AnalysisEvent::Finished(report) => outcome = Some(Ok(report)),
                AnalysisEvent::Failed(err) => outcome = Some(Err(err)),
            }
        }
        handle.task.await.map_err(join_error)?;

        // Files completed before a failure or cancellation are kept.
        let snapshot = Snapshot {
            context,
            history: ChatHistory::new(),
            metadata: ProjectMetadata {
                file_tree: Some(file_tree),
                model: Some(config.model.clone()),
                analyzed_at: Some(Utc::now()),
                ..metadata
            },
        };
        let mut store = open_store(config)?;
        store.save_snapshot(&snapshot)?;
        tracing::info!(
            "Saved {} context items to {:?}",
            snapshot.context.len(),
            config.store_path()
        );

        let report = match outcome {
            Some(Ok(report)) => report,
            Some(Err(err)) => return Err(err),
            None => {
                return Err(AppError::Other(
                    "Analysis worker stopped without a result".to_string(),
                ))
            }
        };

        let stats = snapshot.context.stats();
        if self.json {
            print_json(&serde_json::json!({
                "source": snapshot.metadata.source,
                "ref": snapshot.metadata.git_ref,
                "analyzed": report.analyzed.len(),
                "skipped": report.skipped,
                "warnings": report.warnings,
                "items": stats,
                "cancelled": report.cancelled,
                "elapsedSecs": report.elapsed_secs,
            }))?;
        } else {
            println!(
                "Analyzed {} files in {:.1}s ({} skipped)",
                report.analyzed.len(),
                report.elapsed_secs,
                report.skipped.len()
            );
            println!(
                "Context: {} summaries, {} chunks ({} embedded), {} full files, {} structures",
                stats.summaries, stats.chunks, stats.embedded_chunks, stats.full_files, stats.structures
            );
            for warning in &report.warnings {
                println!("  warning: {}", warning);
            }
            if report.cancelled {
                println!("Analysis was cancelled; completed files were saved.");
            }
        }

        Ok(())
    }

    fn local_root(&self, config: &AppConfig) -> AppResult<PathBuf> {
        let root = self.path.clone().unwrap_or_else(|| config.workspace.clone());
        if !root.is_dir() {
            return Err(AppError::NotFound(root.display().to_string()));
        }
        Ok(root.canonicalize()?)
    }
}

/// Root label of the rendered file tree.
pub(crate) fn project_name(source: Option<&str>) -> String {
    source
        .and_then(|s| Path::new(s).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

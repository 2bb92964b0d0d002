//! Update command handler.
//!
//! Re-analyzes the files git reports as modified or untracked and saves the
//! refreshed context.

use super::analyze::project_name;
use super::{cancel_on_interrupt, embedder, llm_client, open_store, print_json};
use chrono::Utc;
use clap::Args;
use codepilot_core::{config::AppConfig, AppError, AppResult};
use codepilot_knowledge::{
    render_file_tree, AnalysisOptions, AnalysisPipeline, ContentSource, GitWorkingTree,
    IncrementalUpdater, ListingRules, LocalSource,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Re-analyze files changed in the git working tree
#[derive(Args, Debug)]
pub struct UpdateCommand {
    /// Only list the changed files
    #[arg(long)]
    pub dry_run: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl UpdateCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing update command");

        let mut store = open_store(config)?;
        let mut snapshot = store.load_snapshot()?;
        if snapshot.metadata.git_ref.is_some() {
            return Err(AppError::Knowledge(
                "Incremental update needs a local git working tree; run 'codepilot analyze --remote' again instead"
                    .to_string(),
            ));
        }
        let root = snapshot
            .metadata
            .source
            .clone()
            .map(PathBuf::from)
            .ok_or_else(|| {
                AppError::Knowledge("No analyzed project. Run 'codepilot analyze' first.".to_string())
            })?;

        let rules = ListingRules::from(&config.analysis);
        let vcs = GitWorkingTree::open(&root)?;
        let source = LocalSource::new(root, rules.clone());

        let pipeline = Arc::new(AnalysisPipeline::new(
            AnalysisOptions::from_config(config),
            llm_client(config)?,
            embedder(config)?,
        ));
        let updater = IncrementalUpdater::new(pipeline, rules);

        if self.dry_run {
            let changed: Vec<String> = updater.changed_files(&vcs)?.into_iter().collect();
            if self.json {
                print_json(&serde_json::json!({ "changedFiles": changed }))?;
            } else if changed.is_empty() {
                println!("No changed files.");
            } else {
                changed.iter().for_each(|path| println!("{}", path));
            }
            return Ok(());
        }

        let cancel = CancellationToken::new();
        cancel_on_interrupt(cancel.clone());
        let report = updater
            .update(&mut snapshot.context, &vcs, &source, &cancel)
            .await?;

        if !report.changed_files.is_empty() {
            let files = source.list_files().await?;
            let tree = render_file_tree(&project_name(snapshot.metadata.source.as_deref()), &files);
            snapshot.metadata.file_tree = Some(tree);
            snapshot.metadata.analyzed_at = Some(Utc::now());
            store.save_snapshot(&snapshot)?;
        }

        if self.json {
            print_json(&serde_json::json!({
                "changedFiles": report.changed_files,
                "refreshed": report.refreshed,
                "removedItems": report.removed_count,
                "errors": report.errors,
                "warnings": report.warnings,
                "cancelled": report.cancelled,
            }))?;
        } else if report.changed_files.is_empty() {
            println!("No changed files.");
        } else {
            println!(
                "Refreshed {} of {} changed files ({} items replaced)",
                report.refreshed.len(),
                report.changed_files.len(),
                report.removed_count
            );
            for error in &report.errors {
                println!("  error: {}", error);
            }
            for warning in &report.warnings {
                println!("  warning: {}", warning);
            }
            if report.cancelled {
                println!("Update was cancelled; refreshed files were saved.");
            }
        }

        Ok(())
    }
}

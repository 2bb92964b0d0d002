//! Stats command handler.
//!
//! Shows what the stored project context holds.

use super::{open_store, print_json};
use clap::Args;
use codepilot_core::{config::AppConfig, AppResult};

/// Show project context statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Also list every analyzed file
    #[arg(short, long)]
    pub detailed: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");
        tracing::debug!("Stats options: {:?}", self);

        let store = open_store(config)?;
        let snapshot = store.load_snapshot()?;
        let stats = snapshot.context.stats();
        let metadata = &snapshot.metadata;

        if self.json {
            let mut output = serde_json::json!({
                "source": metadata.source,
                "ref": metadata.git_ref,
                "model": metadata.model,
                "analyzedAt": metadata.analyzed_at.map(|t| t.to_rfc3339()),
                "items": stats,
                "historyTurns": snapshot.history.len(),
            });
            if self.detailed {
                output["files"] = serde_json::json!(snapshot.context.file_paths());
            }
            return print_json(&output);
        }

        match &metadata.source {
            Some(source) => match &metadata.git_ref {
                Some(git_ref) => println!("Project: {}@{}", source, git_ref),
                None => println!("Project: {}", source),
            },
            None => {
                println!("No analyzed project. Run 'codepilot analyze' first.");
                return Ok(());
            }
        }
        if let Some(analyzed_at) = metadata.analyzed_at {
            println!("Analyzed: {}", analyzed_at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        if let Some(model) = &metadata.model {
            println!("Model: {}", model);
        }
        println!("Files: {}", stats.files);
        println!("Summaries: {}", stats.summaries);
        println!("Chunks: {} ({} embedded)", stats.chunks, stats.embedded_chunks);
        println!("Full files: {}", stats.full_files);
        println!("Structures: {}", stats.structures);
        println!("Chat turns: {}", snapshot.history.len());

        if self.detailed {
            println!();
            for path in snapshot.context.file_paths() {
                println!("  {}", path);
            }
        }

        Ok(())
    }
}

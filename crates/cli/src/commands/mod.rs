//! Command handlers for the Codepilot CLI.
//!
//! This module organizes all CLI commands into separate submodules, plus the
//! collaborators they share: service clients, the store and content sources.

pub mod analyze;
pub mod ask;
pub mod history;
pub mod stats;
pub mod templates;
pub mod update;

// Re-export command types for convenience
pub use analyze::AnalyzeCommand;
pub use ask::AskCommand;
pub use history::HistoryCommand;
pub use stats::StatsCommand;
pub use templates::TemplatesCommand;
pub use update::UpdateCommand;

use codepilot_core::{config::AppConfig, AppError, AppResult};
use codepilot_knowledge::{
    create_provider, ContentSource, ContextStore, EmbeddingProvider, EmbeddingSettings,
    GitHubSource, ListingRules, LocalSource, ProjectMetadata,
};
use codepilot_llm::{create_client, LlmClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn request_timeout(config: &AppConfig) -> Duration {
    Duration::from_secs(config.analysis.request_timeout_secs)
}

/// Generative client for the active provider.
pub(crate) fn llm_client(config: &AppConfig) -> AppResult<Arc<dyn LlmClient>> {
    config.validate()?;
    let endpoint = config.endpoint(&config.provider);
    let api_key = config.resolve_api_key(&config.provider);
    create_client(
        &config.provider,
        endpoint.as_deref(),
        api_key.as_deref(),
        request_timeout(config),
    )
}

/// Embedding provider, when chunks are embedded and ranked.
pub(crate) fn embedder(config: &AppConfig) -> AppResult<Option<Arc<dyn EmbeddingProvider>>> {
    if !(config.analysis.chunking && config.analysis.semantic_retrieval) {
        return Ok(None);
    }
    let settings = EmbeddingSettings::from_config(config);
    tracing::debug!("Embedding provider: {}", settings.provider);
    create_provider(&settings).map(Some)
}

pub(crate) fn open_store(config: &AppConfig) -> AppResult<ContextStore> {
    config.ensure_state_dir()?;
    ContextStore::open(&config.store_path())
}

/// Content source the stored project was analyzed from.
pub(crate) fn stored_source(
    config: &AppConfig,
    metadata: &ProjectMetadata,
) -> AppResult<Arc<dyn ContentSource>> {
    let rules = ListingRules::from(&config.analysis);
    match (&metadata.source, &metadata.git_ref) {
        (Some(repository), Some(git_ref)) => Ok(Arc::new(GitHubSource::new(
            repository,
            git_ref.clone(),
            config.github_token.clone(),
            rules,
            request_timeout(config),
        )?)),
        (Some(root), None) => Ok(Arc::new(LocalSource::new(PathBuf::from(root), rules))),
        (None, _) => Err(AppError::Knowledge(
            "No analyzed project. Run 'codepilot analyze' first.".to_string(),
        )),
    }
}

/// Cancel `token` on Ctrl-C.
pub(crate) fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping at the next checkpoint");
            token.cancel();
        }
    });
}

pub(crate) fn print_json(value: &serde_json::Value) -> AppResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

pub(crate) fn join_error(err: tokio::task::JoinError) -> AppError {
    AppError::Other(format!("Worker task failed: {}", err))
}

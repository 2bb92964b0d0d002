//! Ask command handler.
//!
//! Runs one interactive turn against the stored project context and appends
//! the question and the answer to the stored chat history.

use super::analyze::project_name;
use super::{cancel_on_interrupt, embedder, join_error, llm_client, open_store, print_json, stored_source};
use clap::Args;
use codepilot_core::{config::AppConfig, AppError, AppResult};
use codepilot_knowledge::{ChatSession, ContextMode, InteractiveEvent, SessionOptions};
use codepilot_prompt::load_template;
use std::path::PathBuf;

/// Ask a question about the analyzed project
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Instruction template to apply
    #[arg(short, long)]
    pub template: Option<String>,

    /// Maximum tokens in response
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self.get_question()?;

        let mut store = open_store(config)?;
        let mut snapshot = store.load_snapshot()?;
        if snapshot.context.is_empty() {
            return Err(AppError::Knowledge(
                "The project context is empty. Run 'codepilot analyze' first.".to_string(),
            ));
        }

        let mut options = SessionOptions::from_config(config);
        if let Some(max_tokens) = self.max_tokens {
            options.max_output_tokens = max_tokens;
        }
        if let Some(id) = &self.template {
            let template = load_template(&config.templates_dir(), id)?;
            let project = project_name(snapshot.metadata.source.as_deref());
            options = options.with_user_instructions(template.render(&project, &config.analysis.response_language)?);
            tracing::debug!("Applied instruction template: {}", template.id);
        }

        let embedder = match options.mode {
            ContextMode::Semantic => embedder(config)?,
            _ => None,
        };
        let history = std::mem::take(&mut snapshot.history);
        let mut session = ChatSession::new(options, llm_client(config)?, embedder, history);
        match stored_source(config, &snapshot.metadata) {
            Ok(source) => session = session.with_source(source),
            Err(e) => tracing::warn!("File requests disabled: {}", e),
        }

        let file_tree = snapshot.metadata.file_tree.clone().unwrap_or_default();
        let mut handle = session.submit(&question, &snapshot.context, &file_tree).await?;
        cancel_on_interrupt(handle.cancel.clone());

        let mut outcome = None;
        while let Some(event) = handle.events.recv().await {
            match event {
                InteractiveEvent::Step(step) => {
                    tracing::info!("{}", step);
                }
                InteractiveEvent::Response { text, notices } => outcome = Some(Ok((text, notices))),
                InteractiveEvent::Failed(err) => outcome = Some(Err(err)),
            }
        }
        handle.task.await.map_err(join_error)?;

        let (answer, notices) = outcome.unwrap_or_else(|| {
            Err(AppError::Other("Interactive worker stopped without a result".to_string()))
        })?;

        session.record_response(answer.clone());
        snapshot.history = session.into_history();
        store.save_snapshot(&snapshot)?;

        if self.json {
            let notices: Vec<String> = notices.iter().map(ToString::to_string).collect();
            print_json(&serde_json::json!({
                "answer": answer,
                "model": config.model,
                "provider": config.provider,
                "notices": notices,
                "historyLength": snapshot.history.len(),
            }))?;
        } else {
            for notice in &notices {
                eprintln!("note: {}", notice);
            }
            println!("{}", answer);
        }

        Ok(())
    }

    /// Get the question text from the argument or the file.
    fn get_question(&self) -> AppResult<String> {
        let question = match (&self.question, &self.file) {
            (Some(question), _) => question.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)?,
            (None, None) => return Err(AppError::Config("No question provided".to_string())),
        };
        if question.trim().is_empty() {
            return Err(AppError::Config("No question provided".to_string()));
        }
        Ok(question)
    }
}

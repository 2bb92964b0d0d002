//! Templates command handler.
//!
//! Lists, shows and saves the instruction templates in `.codepilot/templates/`.

use super::print_json;
use clap::{Args, Subcommand};
use codepilot_core::{config::AppConfig, AppError, AppResult};
use codepilot_prompt::{list_templates, load_template, save_template, InstructionTemplate};
use std::path::PathBuf;

/// Manage instruction templates
#[derive(Args, Debug)]
pub struct TemplatesCommand {
    #[command(subcommand)]
    pub action: TemplatesAction,
}

#[derive(Subcommand, Debug)]
pub enum TemplatesAction {
    /// List saved templates
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print one template
    Show {
        /// Template identifier
        id: String,
    },

    /// Save a template, replacing one with the same identifier
    Save {
        /// Template identifier
        id: String,

        /// Human-readable title (default: the identifier)
        #[arg(long)]
        title: Option<String>,

        /// Template text; `{{project}}` and `{{language}}` are substituted
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,

        /// Read the template text from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

impl TemplatesCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let dir = config.templates_dir();
        match &self.action {
            TemplatesAction::List { json } => {
                let ids = list_templates(&dir)?;
                if *json {
                    return print_json(&serde_json::json!({ "templates": ids }));
                }
                if ids.is_empty() {
                    println!("No templates in {}", dir.display());
                }
                for id in ids {
                    match load_template(&dir, &id) {
                        Ok(template) => println!("{}\t{}", template.id, template.title),
                        Err(e) => tracing::warn!("Skipping template '{}': {}", id, e),
                    }
                }
                Ok(())
            }
            TemplatesAction::Show { id } => {
                let template = load_template(&dir, id)?;
                println!("# {}", template.title);
                println!("{}", template.text);
                Ok(())
            }
            TemplatesAction::Save {
                id,
                title,
                text,
                file,
            } => {
                let text = match (text, file) {
                    (Some(text), _) => text.clone(),
                    (None, Some(path)) => std::fs::read_to_string(path)?,
                    (None, None) => {
                        return Err(AppError::Config(
                            "Provide the template text with --text or --file".to_string(),
                        ))
                    }
                };
                let template = InstructionTemplate {
                    id: id.clone(),
                    title: title.clone().unwrap_or_else(|| id.clone()),
                    text,
                };
                let path = save_template(&dir, &template)?;
                println!("Saved template '{}' to {}", template.id, path.display());
                Ok(())
            }
        }
    }
}

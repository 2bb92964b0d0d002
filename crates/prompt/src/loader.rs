//! Loader for instruction templates stored as YAML files.
//!
//! Templates live in `<templates_dir>/<id>.yml`, where `templates_dir` is
//! resolved by `AppConfig::templates_dir`.

use crate::builder::render_template;
use crate::types::InstructionTemplate;
use codepilot_core::{AppError, AppResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn template_path(templates_dir: &Path, id: &str) -> PathBuf {
    templates_dir.join(format!("{}.yml", id))
}

/// Load an instruction template by ID.
pub fn load_template(templates_dir: &Path, id: &str) -> AppResult<InstructionTemplate> {
    let template_file = template_path(templates_dir, id);

    tracing::debug!("Loading template from: {:?}", template_file);

    if !template_file.exists() {
        return Err(AppError::Prompt(format!(
            "Template file not found: {:?}",
            template_file
        )));
    }

    let contents = std::fs::read_to_string(&template_file).map_err(|e| {
        AppError::Prompt(format!("Failed to read template file {:?}: {}", template_file, e))
    })?;

    let template: InstructionTemplate = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse template YAML {:?}: {}", template_file, e))
    })?;

    validate_template(&template)?;

    Ok(template)
}

/// Save (create or overwrite) an instruction template.
pub fn save_template(templates_dir: &Path, template: &InstructionTemplate) -> AppResult<PathBuf> {
    validate_template(template)?;
    std::fs::create_dir_all(templates_dir)?;

    let path = template_path(templates_dir, &template.id);
    let yaml = serde_yaml::to_string(template)?;
    std::fs::write(&path, yaml)?;

    tracing::info!("Saved template: {} ({})", template.id, template.title);
    Ok(path)
}

/// List all template IDs, sorted.
pub fn list_templates(templates_dir: &Path) -> AppResult<Vec<String>> {
    if !templates_dir.exists() {
        return Ok(Vec::new());
    }

    let mut ids = Vec::new();

    for entry in walkdir::WalkDir::new(templates_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
    }

    ids.sort();
    Ok(ids)
}

impl InstructionTemplate {
    /// Render the template text for a project.
    pub fn render(&self, project: &str, language: &str) -> AppResult<String> {
        let mut vars = HashMap::new();
        vars.insert("project".to_string(), project.to_string());
        vars.insert("language".to_string(), language.to_string());
        render_template(&self.text, &vars)
    }
}

fn validate_template(template: &InstructionTemplate) -> AppResult<()> {
    if template.id.is_empty() {
        return Err(AppError::Prompt("Template ID cannot be empty".to_string()));
    }

    if template
        .id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
    {
        return Err(AppError::Prompt(format!(
            "Invalid template ID: {}. Use letters, digits, '-', '_' or '.'",
            template.id
        )));
    }

    if template.text.trim().is_empty() {
        return Err(AppError::Prompt("Template text cannot be empty".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn template(id: &str) -> InstructionTemplate {
        InstructionTemplate {
            id: id.to_string(),
            title: "Reviewer".to_string(),
            text: "Review {{project}} and answer in {{language}}.".to_string(),
        }
    }

    #[test]
    fn test_save_and_load_template() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("templates");

        save_template(&dir, &template("reviewer")).unwrap();
        let loaded = load_template(&dir, "reviewer").unwrap();
        assert_eq!(loaded, template("reviewer"));
        assert_eq!(
            loaded.render("codepilot", "English").unwrap(),
            "Review codepilot and answer in English."
        );
    }

    #[test]
    fn test_load_nonexistent_template() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_template(temp_dir.path(), "nonexistent").is_err());
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("broken.yml"), "invalid: yaml: content:").unwrap();
        assert!(load_template(temp_dir.path(), "broken").is_err());
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let temp_dir = TempDir::new().unwrap();
        assert!(save_template(temp_dir.path(), &template("../escape")).is_err());
    }

    #[test]
    fn test_list_templates_sorted() {
        let temp_dir = TempDir::new().unwrap();
        save_template(temp_dir.path(), &template("zeta")).unwrap();
        save_template(temp_dir.path(), &template("alpha")).unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(list_templates(temp_dir.path()).unwrap(), vec!["alpha", "zeta"]);
        assert!(list_templates(&temp_dir.path().join("missing")).unwrap().is_empty());
    }
}

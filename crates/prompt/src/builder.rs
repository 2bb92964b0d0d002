//! Handlebars rendering of instructions, summary prompts and the project overview.

use codepilot_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;

const BASE_INSTRUCTIONS: &str = r#"You are a highly skilled assistant for programming and code analysis. You are given context that includes:
1. The full file tree of the project.
2. Code fragments (chunks) and short summaries of the files judged relevant to the question.

Your task is to answer questions about the code.

**CRITICAL RULE:**
If the provided fragments are not enough to answer, but you can see the file you need in the **file tree**, request its content. In that case your reply must be ONLY a JSON object of exactly this form:
```json
{"action": "request_file", "file_path": "full/path/to/file.py"}
```
Do not add any other text. The file content will be provided and you can then give the final answer to the original question.

If the information is sufficient, or you are not sure which file is needed, or the question is not about code, answer normally based on the provided context. Always explain what you propose to change and why. Suggest Conventional Commits style messages where appropriate.
{{#if user_instructions}}

Additional user instructions:
{{user_instructions}}
{{/if}}

Please answer all questions in {{language}} unless asked otherwise."#;

const SUMMARY_PROMPT: &str = r#"Analyze the contents of this file:

--- START OF FILE: {{file_path}} ---
{{file_content}}
--- END OF FILE ---

Write a brief but comprehensive summary (2-4 sentences) of the file's purpose and main contents: key classes, functions and their responsibilities. Answer in {{language}}."#;

const OVERVIEW: &str = r#"{{#if file_tree}}**Project file tree:**
```
{{file_tree}}
```
{{/if}}{{#if structure}}
**Declared structure per file:**
{{structure}}
{{/if}}"#;

/// Render a Handlebars template with variables.
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text output, no HTML escaping
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

/// System instructions with optional user additions and the answer language.
pub fn build_instructions(user_instructions: Option<&str>, language: &str) -> AppResult<String> {
    let mut vars = HashMap::new();
    if let Some(text) = user_instructions.map(str::trim).filter(|t| !t.is_empty()) {
        vars.insert("user_instructions".to_string(), text.to_string());
    }
    vars.insert("language".to_string(), language.to_string());
    Ok(render_template(BASE_INSTRUCTIONS, &vars)?.trim().to_string())
}

/// Prompt asking for a 2-4 sentence summary of one file.
pub fn build_summary_prompt(file_path: &str, content: &str, language: &str) -> AppResult<String> {
    let mut vars = HashMap::new();
    vars.insert("file_path".to_string(), file_path.to_string());
    vars.insert("file_content".to_string(), content.to_string());
    vars.insert("language".to_string(), language.to_string());
    render_template(SUMMARY_PROMPT, &vars)
}

/// Structural overview: the file tree followed by per-file structure text.
///
/// Returns an empty string when both parts are empty.
pub fn build_overview(file_tree: &str, structure: &str) -> AppResult<String> {
    let mut vars = HashMap::new();
    if !file_tree.trim().is_empty() {
        vars.insert("file_tree".to_string(), file_tree.trim_end().to_string());
    }
    if !structure.trim().is_empty() {
        vars.insert("structure".to_string(), structure.trim_end().to_string());
    }
    Ok(render_template(OVERVIEW, &vars)?.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_simple_template() {
        let mut vars = HashMap::new();
        vars.insert("prompt".to_string(), "Hello <world>!".to_string());

        let result = render_template("Question: {{prompt}}", &vars).unwrap();
        assert_eq!(result, "Question: Hello <world>!");
    }

    #[test]
    fn test_render_template_missing_variable() {
        let result = render_template("Question: {{missing}}", &HashMap::new());
        assert_eq!(result.unwrap(), "Question: ");
    }

    #[test]
    fn test_instructions_with_and_without_user_text() {
        let plain = build_instructions(None, "English").unwrap();
        assert!(!plain.contains("Additional user instructions"));
        assert!(plain.ends_with("Please answer all questions in English unless asked otherwise."));
        assert!(plain.contains(r#"{"action": "request_file""#));

        let extended = build_instructions(Some("  Prefer small diffs.  "), "Russian").unwrap();
        assert!(extended.contains("Additional user instructions:\nPrefer small diffs."));
        assert!(extended.contains("in Russian"));
    }

    #[test]
    fn test_summary_prompt_embeds_path_and_content() {
        let prompt = build_summary_prompt("src/app.py", "print('hi')", "English").unwrap();
        assert!(prompt.contains("--- START OF FILE: src/app.py ---\nprint('hi')\n--- END OF FILE ---"));
        assert!(prompt.contains("2-4 sentences"));
    }

    #[test]
    fn test_overview_parts() {
        assert_eq!(build_overview("", "  ").unwrap(), "");

        let overview = build_overview("repo/\n└── a.py", "a.py: imports os").unwrap();
        assert!(overview.starts_with("**Project file tree:**\n```\nrepo/\n└── a.py\n```"));
        assert!(overview.ends_with("a.py: imports os"));

        let structure_only = build_overview("", "a.py: imports os").unwrap();
        assert!(structure_only.starts_with("**Declared structure per file:**"));
    }
}

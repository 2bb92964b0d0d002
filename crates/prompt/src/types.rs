//! Prompt types for Codepilot.
//!
//! This module defines the chat transcript, the inputs and outputs of prompt
//! assembly, and stored instruction templates.

use codepilot_core::{AppError, AppResult};
use codepilot_llm::{ChatMessage, Role};
use serde::{Deserialize, Serialize};

/// One exchange unit of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,

    /// Present in the transcript but left out of future prompts
    #[serde(default)]
    pub excluded: bool,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            excluded: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self::new(Role::Model, content)
    }

    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

/// Append-only transcript. Only the `excluded` flag of a past turn can change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistory {
    turns: Vec<ChatTurn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a transcript from persisted turns.
    pub fn from_turns(turns: Vec<ChatTurn>) -> Self {
        Self { turns }
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn set_excluded(&mut self, index: usize, excluded: bool) -> AppResult<()> {
        let turn = self.turns.get_mut(index).ok_or_else(|| {
            AppError::Prompt(format!("No chat turn at index {}", index))
        })?;
        turn.excluded = excluded;
        Ok(())
    }
}

/// One rendered piece of project context, placed in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBlock {
    /// Header line identifying the fragment
    pub label: String,
    pub body: String,
}

impl ContextBlock {
    pub fn new(label: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            body: body.into(),
        }
    }

    pub fn render(&self) -> String {
        format!("{}\n{}", self.label, self.body)
    }
}

/// Everything the assembler needs for one request.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyInput<'a> {
    /// Rendered system instructions (mandatory)
    pub instructions: &'a str,

    /// File tree plus per-file structure; may be empty
    pub structural_overview: &'a str,

    /// Context blocks, most important first
    pub context: &'a [ContextBlock],

    /// Transcript preceding the pending question
    pub history: &'a [ChatTurn],

    /// The pending user turn (mandatory)
    pub question: &'a str,
}

/// Something the assembler left out, reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssemblyNotice {
    /// Trailing context blocks did not fit
    ContextTruncated { included: usize, omitted: usize },

    /// Older history turns did not fit
    HistoryTruncated { included: usize, omitted: usize },

    /// The counting service was unavailable; sizes are estimates
    EstimatedTokens,
}

impl std::fmt::Display for AssemblyNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssemblyNotice::ContextTruncated { included, omitted } => write!(
                f,
                "Project context truncated: {} fragment(s) included, {} omitted",
                included, omitted
            ),
            AssemblyNotice::HistoryTruncated { included, omitted } => write!(
                f,
                "Chat history truncated: {} turn(s) included, {} omitted",
                included, omitted
            ),
            AssemblyNotice::EstimatedTokens => {
                write!(f, "Token counts are estimates (counting service unavailable)")
            }
        }
    }
}

/// Result of prompt assembly.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    /// Strictly role-alternating message sequence
    pub messages: Vec<ChatMessage>,

    /// Measured size of `messages`
    pub token_count: usize,

    /// Budget the sequence was assembled for
    pub token_budget: usize,

    pub notices: Vec<AssemblyNotice>,
}

/// A named instruction text saved in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionTemplate {
    /// Unique identifier, also the file stem
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// Handlebars text; `{{project}}` and `{{language}}` are provided
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_only_excluded_flag_changes() {
        let mut history = ChatHistory::new();
        history.push(ChatTurn::user("question"));
        history.push(ChatTurn::model("answer"));

        history.set_excluded(0, true).unwrap();
        assert!(history.turns()[0].excluded);
        assert_eq!(history.turns()[0].content, "question");
        assert!(history.set_excluded(5, true).is_err());
    }

    #[test]
    fn test_chat_turn_deserializes_without_excluded() {
        let turn: ChatTurn = serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert!(!turn.excluded);
    }

    #[test]
    fn test_context_block_render() {
        let block = ContextBlock::new("--- Fragment from file: a.py ---", "print(1)");
        assert_eq!(block.render(), "--- Fragment from file: a.py ---\nprint(1)");
    }

    #[test]
    fn test_template_deserialization() {
        let yaml = r#"
id: reviewer
title: Code reviewer
text: "Review {{project}} strictly."
"#;
        let template: InstructionTemplate = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(template.id, "reviewer");
        assert!(template.text.contains("{{project}}"));
    }
}

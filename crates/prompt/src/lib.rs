//! Prompt system for Codepilot.
//!
//! This crate turns instructions, project context and chat history into the
//! message sequence sent to the generative model:
//! - Chat transcript types (`ChatTurn`, `ChatHistory`)
//! - Token counting with a service-backed counter and a heuristic fallback
//! - Budget-bounded, role-alternating prompt assembly
//! - Handlebars rendering of instructions and summary prompts
//! - YAML instruction templates stored in the workspace
//! - Detection of model requests for additional files

pub mod assembler;
pub mod builder;
pub mod counter;
pub mod file_request;
pub mod loader;
pub mod roles;
pub mod types;

// Re-export main types
pub use assembler::PromptBudgetAssembler;
pub use builder::{build_instructions, build_overview, build_summary_prompt, render_template};
pub use counter::{HeuristicCounter, ServiceCounter, TokenCount, TokenCounter};
pub use file_request::{parse_file_request, requested_file_turn, MAX_REQUESTED_FILE_BYTES};
pub use loader::{list_templates, load_template, save_template};
pub use roles::normalize_roles;
pub use types::{
    AssembledPrompt, AssemblyInput, AssemblyNotice, ChatHistory, ChatTurn, ContextBlock,
    InstructionTemplate,
};

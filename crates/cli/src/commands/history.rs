//! History command handler.
//!
//! Shows the stored chat transcript and toggles which turns future prompts
//! include.

use super::{open_store, print_json};
use clap::{Args, Subcommand};
use codepilot_core::{config::AppConfig, AppResult};
use codepilot_prompt::ChatTurn;

/// Inspect the chat history
#[derive(Args, Debug)]
pub struct HistoryCommand {
    #[command(subcommand)]
    pub action: HistoryAction,
}

#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// List every turn with its index
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Leave a turn out of future prompts
    Exclude {
        /// Turn index as shown by `history list`
        index: usize,
    },

    /// Include a previously excluded turn again
    Include {
        /// Turn index as shown by `history list`
        index: usize,
    },
}

impl HistoryCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let mut store = open_store(config)?;
        match &self.action {
            HistoryAction::List { json } => {
                let history = store.load_history()?;
                if *json {
                    return print_json(&serde_json::json!({ "turns": history.turns() }));
                }
                if history.is_empty() {
                    println!("No chat history.");
                }
                for (index, turn) in history.turns().iter().enumerate() {
                    println!("{}", format_turn(index, turn));
                }
                Ok(())
            }
            HistoryAction::Exclude { index } => set_excluded(&mut store, *index, true),
            HistoryAction::Include { index } => set_excluded(&mut store, *index, false),
        }
    }
}

fn set_excluded(
    store: &mut codepilot_knowledge::ContextStore,
    index: usize,
    excluded: bool,
) -> AppResult<()> {
    let mut snapshot = store.load_snapshot()?;
    snapshot.history.set_excluded(index, excluded)?;
    store.save_snapshot(&snapshot)?;
    let state = if excluded { "excluded from" } else { "included in" };
    println!("Turn {} is now {} future prompts", index, state);
    Ok(())
}

/// One listing line: index, role, marker and the first line of content.
fn format_turn(index: usize, turn: &ChatTurn) -> String {
    let marker = if turn.excluded { " (excluded)" } else { "" };
    let first_line = turn.content.lines().next().unwrap_or_default();
    let preview: String = first_line.chars().take(80).collect();
    let ellipsis = if first_line.chars().count() > 80 || turn.content.lines().nth(1).is_some() {
        "..."
    } else {
        ""
    };
    format!(
        "[{}] {}{}: {}{}",
        index,
        turn.role.as_str(),
        marker,
        preview,
        ellipsis
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_turn() {
        let mut turn = ChatTurn::user("What does main do?\nAnd why?");
        assert_eq!(format_turn(0, &turn), "[0] user: What does main do?...");

        turn.excluded = true;
        assert_eq!(format_turn(3, &turn), "[3] user (excluded): What does main do?...");

        let turn = ChatTurn::model("Short.");
        assert_eq!(format_turn(1, &turn), "[1] model: Short.");
    }
}

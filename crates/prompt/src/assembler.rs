//! Budget-bounded prompt assembly.
//!
//! Stages, highest priority first:
//! 1. instructions and structural overview (mandatory; their model
//!    acknowledgements are dropped when only the bare turns fit)
//! 2. project context blocks, prefix in priority order
//! 3. chat history, newest to oldest, contiguous suffix
//! 4. the pending question (mandatory, reserved up front)
//!
//! The assembled sequence is normalized to strict role alternation and then
//! measured as a whole; if normalization pushed it over budget, the oldest
//! history turn and then the last context block are dropped until it fits.

use crate::counter::{TokenCount, TokenCounter};
use crate::roles::normalize_roles;
use crate::types::{AssembledPrompt, AssemblyInput, AssemblyNotice, ContextBlock};
use codepilot_core::{AppError, AppResult};
use codepilot_llm::{estimate_tokens, ChatMessage};

const INSTRUCTIONS_ACK: &str = "OK. I am ready. The file request rule and answer language are accepted.";
const OVERVIEW_ACK: &str = "OK. I have the project overview.";
const CONTEXT_HEADER: &str = "**Context from relevant project fragments:**\n";
const CONTEXT_ACK: &str = "OK. I have the context from the fragments.";

pub struct PromptBudgetAssembler<C: TokenCounter> {
    counter: C,
}

/// Running state of one assembly.
struct Tally {
    exact: bool,
}

impl Tally {
    fn record(&mut self, count: TokenCount) -> usize {
        self.exact &= count.exact;
        count.tokens
    }
}

impl<C: TokenCounter> PromptBudgetAssembler<C> {
    pub fn new(counter: C) -> Self {
        Self { counter }
    }

    /// Assemble a role-alternating message sequence of at most `token_budget` tokens.
    ///
    /// # Errors
    /// `AppError::DoesNotFit` when the instructions or the question cannot fit.
    pub async fn assemble(&self, input: &AssemblyInput<'_>, token_budget: usize) -> AppResult<AssembledPrompt> {
        let mut tally = Tally { exact: true };

        let question = ChatMessage::user(input.question);
        let question_tokens = tally.record(self.counter.count(std::slice::from_ref(&question)).await);

        let full_base = base_messages(input, true);
        let full_tokens = tally.record(self.counter.count(&full_base).await);
        let (base, reserved) = if full_tokens + question_tokens <= token_budget {
            (full_base, full_tokens + question_tokens)
        } else {
            let bare = base_messages(input, false);
            let bare_tokens = tally.record(self.counter.count(&bare).await);
            if bare_tokens > token_budget {
                return Err(AppError::DoesNotFit {
                    component: "Instructions and project overview".to_string(),
                    required: bare_tokens,
                    available: token_budget,
                });
            }
            let floor = normalize_roles(compose(&bare, &[], &[], &question));
            let floor_tokens = tally.record(self.counter.count(&floor).await);
            if floor_tokens > token_budget {
                return Err(AppError::DoesNotFit {
                    component: "Question".to_string(),
                    required: question_tokens,
                    available: token_budget - bare_tokens,
                });
            }
            tracing::debug!(
                "Acknowledgement turns dropped: {} tokens with them, {} available",
                full_tokens + question_tokens,
                token_budget
            );
            (bare, floor_tokens)
        };
        let mut remaining = token_budget - reserved;

        let mut notices = Vec::new();

        // Stage 2: context prefix
        let (mut accepted, context_tokens) = self
            .fit_context(input.context, remaining, &mut tally)
            .await;
        remaining -= context_tokens;
        if accepted < input.context.len() {
            tracing::warn!(
                "Project context truncated: {} of {} fragments fit",
                accepted,
                input.context.len()
            );
        }

        // Stage 3: history suffix, newest first
        let eligible: Vec<ChatMessage> = input
            .history
            .iter()
            .filter(|turn| !turn.excluded)
            .map(|turn| turn.to_message())
            .collect();
        let mut history: Vec<ChatMessage> = Vec::new();
        for message in eligible.iter().rev() {
            let tokens = tally.record(self.counter.count(std::slice::from_ref(message)).await);
            if tokens > remaining {
                break;
            }
            remaining -= tokens;
            history.insert(0, message.clone());
        }

        // Normalize and verify the whole sequence
        let mut history_dropped = 0usize;
        let (messages, total) = loop {
            let messages = normalize_roles(compose(
                &base,
                &input.context[..accepted],
                &history[history_dropped..],
                &question,
            ));
            let total = tally.record(self.counter.count(&messages).await);
            if total <= token_budget {
                break (messages, total);
            }
            if history_dropped < history.len() {
                history_dropped += 1;
            } else if accepted > 0 {
                accepted -= 1;
            } else {
                return Err(AppError::DoesNotFit {
                    component: "Prompt".to_string(),
                    required: total,
                    available: token_budget,
                });
            }
        };

        if accepted < input.context.len() {
            notices.push(AssemblyNotice::ContextTruncated {
                included: accepted,
                omitted: input.context.len() - accepted,
            });
        }
        let included_history = history.len() - history_dropped;
        if included_history < eligible.len() {
            notices.push(AssemblyNotice::HistoryTruncated {
                included: included_history,
                omitted: eligible.len() - included_history,
            });
        }
        if !tally.exact {
            notices.push(AssemblyNotice::EstimatedTokens);
        }

        tracing::debug!(
            "Assembled {} messages, {} of {} tokens",
            messages.len(),
            total,
            token_budget
        );

        Ok(AssembledPrompt {
            messages,
            token_count: total,
            token_budget,
            notices,
        })
    }

    /// Longest prefix of `blocks` whose wrapper fits in `remaining`.
    ///
    /// A running estimate picks the candidate prefix; the wrapper is then
    /// measured and shrunk from the tail until the measurement fits.
    async fn fit_context(&self, blocks: &[ContextBlock], remaining: usize, tally: &mut Tally) -> (usize, usize) {
        if blocks.is_empty() {
            return (0, 0);
        }

        let overhead = estimate_tokens(&context_messages(&[]));
        let mut running = overhead;
        let mut accepted = 0;
        for block in blocks {
            let cost = block_cost(block);
            if running + cost > remaining {
                break;
            }
            running += cost;
            accepted += 1;
        }

        while accepted > 0 {
            let measured = tally.record(self.counter.count(&context_messages(&blocks[..accepted])).await);
            if measured <= remaining {
                return (accepted, measured);
            }
            accepted -= 1;
        }
        (0, 0)
    }
}

/// Instructions and the optional overview, each followed by a model
/// acknowledgement when `acknowledged` is set.
fn base_messages(input: &AssemblyInput<'_>, acknowledged: bool) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::user(input.instructions)];
    if acknowledged {
        messages.push(ChatMessage::model(INSTRUCTIONS_ACK));
    }
    if !input.structural_overview.trim().is_empty() {
        messages.push(ChatMessage::user(input.structural_overview));
        if acknowledged {
            messages.push(ChatMessage::model(OVERVIEW_ACK));
        }
    }
    messages
}

/// The context wrapper pair for the given blocks; empty when there are none.
fn context_messages(blocks: &[ContextBlock]) -> Vec<ChatMessage> {
    let body = blocks
        .iter()
        .map(ContextBlock::render)
        .collect::<Vec<_>>()
        .join("\n\n");
    vec![
        ChatMessage::user(format!("{}{}", CONTEXT_HEADER, body)),
        ChatMessage::model(CONTEXT_ACK),
    ]
}

/// Estimated cost of one block inside the wrapper, separator included.
fn block_cost(block: &ContextBlock) -> usize {
    (block.render().chars().count() + 2).div_ceil(4)
}

fn compose(
    base: &[ChatMessage],
    context: &[ContextBlock],
    history: &[ChatMessage],
    question: &ChatMessage,
) -> Vec<ChatMessage> {
    let mut messages = base.to_vec();
    if !context.is_empty() {
        messages.extend(context_messages(context));
    }
    messages.extend_from_slice(history);
    messages.push(question.clone());
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::HeuristicCounter;
    use crate::roles::alternates;
    use crate::types::ChatTurn;
    use codepilot_llm::Role;

    fn assembler() -> PromptBudgetAssembler<HeuristicCounter> {
        PromptBudgetAssembler::new(HeuristicCounter)
    }

    fn blocks(n: usize, body_len: usize) -> Vec<ContextBlock> {
        (0..n)
            .map(|i| ContextBlock::new(format!("--- Fragment {} ---", i), "x".repeat(body_len)))
            .collect()
    }

    fn history(n: usize) -> Vec<ChatTurn> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    ChatTurn::user(format!("question number {}", i))
                } else {
                    ChatTurn::model(format!("answer number {}", i))
                }
            })
            .collect()
    }

    fn mandatory_tokens(input: &AssemblyInput<'_>) -> usize {
        estimate_tokens(&base_messages(input, true)) + estimate_tokens(&[ChatMessage::user(input.question)])
    }

    /// Tokens of the smallest prompt: bare instructions and overview merged with the question.
    fn floor_tokens(input: &AssemblyInput<'_>) -> usize {
        let bare = base_messages(input, false);
        estimate_tokens(&normalize_roles(compose(&bare, &[], &[], &ChatMessage::user(input.question))))
    }

    #[tokio::test]
    async fn test_everything_fits() {
        let context = blocks(3, 40);
        let turns = history(4);
        let input = AssemblyInput {
            instructions: "Be helpful.",
            structural_overview: "repo/\n└── a.py",
            context: &context,
            history: &turns,
            question: "What does a.py do?",
        };

        let prompt = assembler().assemble(&input, 10_000).await.unwrap();
        assert!(alternates(&prompt.messages));
        assert_eq!(prompt.messages.first().unwrap().content, "Be helpful.");
        assert_eq!(prompt.messages.last().unwrap().content, "What does a.py do?");
        assert_eq!(prompt.notices, vec![AssemblyNotice::EstimatedTokens]);
        assert!(prompt.token_count <= 10_000);
    }

    #[tokio::test]
    async fn test_instructions_too_large_is_does_not_fit() {
        let instructions = "i".repeat(400);
        let input = AssemblyInput {
            instructions: &instructions,
            structural_overview: "",
            context: &[],
            history: &[],
            question: "q",
        };
        let err = assembler().assemble(&input, 50).await.unwrap_err();
        assert!(matches!(err, AppError::DoesNotFit { ref component, .. } if component.starts_with("Instructions")));
    }

    #[tokio::test]
    async fn test_acknowledgements_dropped_at_the_floor() {
        let instructions = "a".repeat(40);
        let input = AssemblyInput {
            instructions: &instructions,
            structural_overview: "",
            context: &[],
            history: &[],
            question: "what?",
        };
        assert_eq!(floor_tokens(&input), 12);
        assert!(mandatory_tokens(&input) > 12);

        let prompt = assembler().assemble(&input, 12).await.unwrap();
        assert!(prompt.token_count <= 12);
        assert_eq!(prompt.messages.len(), 1);
        assert_eq!(prompt.messages[0].role, Role::User);
        assert_eq!(prompt.messages[0].content, format!("{}\n\nwhat?", instructions));

        let err = assembler().assemble(&input, 11).await.unwrap_err();
        assert!(matches!(err, AppError::DoesNotFit { ref component, .. } if component == "Question"));
    }

    #[tokio::test]
    async fn test_question_too_large_is_does_not_fit() {
        let question = "q".repeat(400);
        let input = AssemblyInput {
            instructions: "short",
            structural_overview: "",
            context: &[],
            history: &[],
            question: &question,
        };
        let err = assembler().assemble(&input, 60).await.unwrap_err();
        assert!(matches!(err, AppError::DoesNotFit { ref component, .. } if component == "Question"));
    }

    #[tokio::test]
    async fn test_context_prefix_kept_tail_omitted() {
        let context = blocks(10, 200);
        let input = AssemblyInput {
            instructions: "Be helpful.",
            structural_overview: "",
            context: &context,
            history: &[],
            question: "q?",
        };
        let budget = mandatory_tokens(&input) + 200;
        let prompt = assembler().assemble(&input, budget).await.unwrap();

        let context_message = &prompt.messages[2];
        assert!(context_message.content.starts_with(CONTEXT_HEADER));
        assert!(context_message.content.contains("--- Fragment 0 ---"));
        assert!(!context_message.content.contains("--- Fragment 9 ---"));
        assert!(matches!(
            prompt.notices[0],
            AssemblyNotice::ContextTruncated { included, omitted } if included + omitted == 10 && included > 0
        ));
        assert!(prompt.token_count <= budget);
    }

    #[tokio::test]
    async fn test_history_keeps_newest_contiguous_suffix() {
        let turns = history(10);
        let input = AssemblyInput {
            instructions: "Be helpful.",
            structural_overview: "",
            context: &[],
            history: &turns,
            question: "final?",
        };
        // Room for roughly four history turns.
        let budget = mandatory_tokens(&input) + 20;
        let prompt = assembler().assemble(&input, budget).await.unwrap();

        let kept: Vec<&str> = prompt.messages[2..prompt.messages.len() - 1]
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert!(!kept.is_empty());
        let expected_tail: Vec<String> = turns[turns.len() - kept.len()..]
            .iter()
            .map(|t| t.content.clone())
            .collect();
        assert_eq!(kept, expected_tail);
        assert!(prompt.token_count <= budget);
    }

    #[tokio::test]
    async fn test_excluded_turns_are_skipped() {
        let mut turns = history(4);
        turns[1].excluded = true;
        turns[1].content = "SECRET".to_string();
        let input = AssemblyInput {
            instructions: "Be helpful.",
            structural_overview: "",
            context: &[],
            history: &turns,
            question: "final?",
        };
        let prompt = assembler().assemble(&input, 10_000).await.unwrap();
        assert!(prompt.messages.iter().all(|m| !m.content.contains("SECRET")));
        assert!(alternates(&prompt.messages));
    }

    #[tokio::test]
    async fn test_trailing_user_turn_merges_with_question() {
        // A previous question without an answer must not produce two user turns.
        let turns = vec![ChatTurn::user("earlier question")];
        let input = AssemblyInput {
            instructions: "Be helpful.",
            structural_overview: "",
            context: &[],
            history: &turns,
            question: "new question",
        };
        let prompt = assembler().assemble(&input, 10_000).await.unwrap();
        let last = prompt.messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "earlier question\n\nnew question");
    }

    #[tokio::test]
    async fn test_budget_never_exceeded() {
        let context = blocks(6, 90);
        let mut turns = history(9);
        turns.push(ChatTurn::new(Role::System, "system note"));
        let input = AssemblyInput {
            instructions: "Follow the rules.",
            structural_overview: "repo/\n├── a.py\n└── b.py",
            context: &context,
            history: &turns,
            question: "Which file parses input?",
        };
        let floor = floor_tokens(&input);
        assert!(assembler().assemble(&input, floor - 1).await.is_err());
        for budget in floor..floor + 400 {
            let prompt = assembler().assemble(&input, budget).await.unwrap();
            assert!(prompt.token_count <= budget, "budget {} exceeded", budget);
            assert_eq!(prompt.token_count, estimate_tokens(&prompt.messages));
            assert!(alternates(&prompt.messages));
        }
    }
}

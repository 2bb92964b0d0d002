//! Role-alternation normalization.

use codepilot_llm::{ChatMessage, Role};

/// Rewrite a message sequence so `user` and `model` strictly alternate.
///
/// System turns become user turns. Adjacent user turns are merged, the later
/// content appended to the earlier. Of two adjacent model turns the earlier
/// one is kept.
pub fn normalize_roles(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut normalized: Vec<ChatMessage> = Vec::with_capacity(messages.len());

    for mut message in messages {
        if message.role == Role::System {
            message.role = Role::User;
        }

        match normalized.last_mut() {
            Some(last) if last.role == message.role => {
                if message.role == Role::User {
                    last.content.push_str("\n\n");
                    last.content.push_str(&message.content);
                } else {
                    tracing::debug!(
                        "Dropping model turn adjacent to another model turn ({} chars)",
                        message.content.len()
                    );
                }
            }
            _ => normalized.push(message),
        }
    }

    normalized
}

/// Whether roles strictly alternate and no system role remains.
pub fn alternates(messages: &[ChatMessage]) -> bool {
    messages.iter().all(|m| m.role != Role::System)
        && messages.windows(2).all(|pair| pair[0].role != pair[1].role)
}

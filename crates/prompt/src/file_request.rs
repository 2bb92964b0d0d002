//! Detection of model replies that ask for an additional file.
//!
//! The instructions tell the model to answer with
//! `{"action": "request_file", "file_path": "..."}` when it needs a file it
//! can only see in the file tree. The reply may wrap the object in a
//! ```json fence.

use codepilot_llm::ChatMessage;
use serde::Deserialize;

/// Largest requested file that is forwarded to the model.
pub const MAX_REQUESTED_FILE_BYTES: usize = 200 * 1024;

#[derive(Debug, Deserialize)]
struct FileRequest {
    action: String,
    #[serde(default)]
    file_path: Option<String>,
}

/// Return the requested path if `reply` is a file request.
pub fn parse_file_request(reply: &str) -> Option<String> {
    let candidate = fenced_json(reply).unwrap_or_else(|| reply.trim());
    let request: FileRequest = serde_json::from_str(candidate).ok()?;
    if request.action != "request_file" {
        return None;
    }
    request
        .file_path
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
}

/// Body of the first ```json fence, if any.
fn fenced_json(reply: &str) -> Option<&str> {
    let start = reply.find("```json")? + "```json".len();
    let rest = &reply[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

/// User turn carrying the content of a requested file.
pub fn requested_file_turn(file_path: &str, content: &str) -> ChatMessage {
    ChatMessage::user(format!(
        "Here is the content of the requested file '{}':\n\n```\n{}\n```\n\nNow please answer my original question using this information.",
        file_path, content
    ))
}

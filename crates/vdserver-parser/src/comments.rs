//! Comment task extraction (`TODO`, `FIXME`, ...).

use crate::{CodeLocation, LineIndex, Span};
use serde::Serialize;

/// A task marker found in a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentTask {
    /// Location of the first character of the task token.
    pub location: CodeLocation,
    /// Comment text from the task token to the end of the line.
    pub message: String,
}

/// Find task comments.
///
/// A line of a comment is a task when, after stripping comment markers and
/// leading whitespace, it starts with one of `tokens` and the token is not
/// immediately followed by an identifier character (`TODOS` is not a task).
pub fn extract_tasks(
    source: &str,
    index: &LineIndex,
    comments: &[Span],
    tokens: &[String],
) -> Vec<CommentTask> {
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut tasks = Vec::new();
    for comment in comments {
        let text = comment.text(source);
        let mut line_offset = comment.start;
        for line in text.split('\n') {
            let stripped = line.trim_start_matches([' ', '\t', '\r', '/', '*', '+']);
            let lead = line.len() - stripped.len();
            if let Some(message) = match_task(stripped, tokens) {
                tasks.push(CommentTask {
                    location: index.location(source, line_offset + lead),
                    message,
                });
            }
            line_offset += line.len() + 1;
        }
    }
    tasks
}

fn match_task(text: &str, tokens: &[String]) -> Option<String> {
    tokens.iter().find(|token| {
        !token.is_empty()
            && text.starts_with(token.as_str())
            && !text[token.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    })?;

    let message = text.trim_end();
    let message = message
        .strip_suffix("*/")
        .or_else(|| message.strip_suffix("+/"))
        .unwrap_or(message);
    Some(message.trim_end().to_string())
}

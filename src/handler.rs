//! Pure helpers for validating and appending messages to a conversation.

use crate::error::ValidationError;
use crate::model::{ChatMessage, ChatState, Role};

/// Returns the content unchanged, or an error if it is blank after trimming.
pub fn validate_content(content: &str) -> Result<&str, ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    Ok(content)
}

/// Builds a new state with one more message at the end.
///
/// The input state is left as it was, so a caller can drop the result if
/// a later step fails.
pub fn append(state: &ChatState, role: Role, content: &str) -> Result<ChatState, ValidationError> {
    let content = validate_content(content)?;
    let mut next = state.clone();
    next.push(ChatMessage::new(role, content));
    Ok(next)
}

use parley_contracts::chat::{Message, Role};
use serde_json::Value;

use crate::sanitize::sanitize_input;

/// Keeps the most recent `max_history` messages and re-sanitizes each one.
///
/// User messages that sanitize to nothing are dropped; assistant and system
/// messages are kept even when empty so turn pairing survives.
pub fn prepare_history(history: &[Message], max_history: usize, max_message_len: usize) -> Vec<Message> {
    window(history, max_history)
        .iter()
        .filter_map(|message| clean_message(message.role, &message.content, max_message_len))
        .collect()
}

/// Same as [`prepare_history`] for raw `{role, content}` entries, such as a
/// transcript reloaded from disk. Malformed entries are dropped.
pub fn prepare_history_values(entries: &[Value], max_history: usize, max_message_len: usize) -> Vec<Message> {
    window(entries, max_history)
        .iter()
        .filter_map(Message::from_value)
        .filter_map(|message| clean_message(message.role, &message.content, max_message_len))
        .collect()
}

fn window<T>(items: &[T], max: usize) -> &[T] {
    &items[items.len().saturating_sub(max)..]
}

fn clean_message(role: Role, content: &str, max_message_len: usize) -> Option<Message> {
    let content = sanitize_input(content, max_message_len);
    if content.is_empty() && role == Role::User {
        return None;
    }
    Some(Message::new(role, content))
}

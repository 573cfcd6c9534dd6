use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }

    /// Heading used when a transcript is exported as text.
    pub fn export_label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Reads a `{role, content}` object. Entries with a missing or unknown
    /// role, or a missing or non-string content, yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let role = object.get("role").and_then(Value::as_str).and_then(Role::parse)?;
        let content = object.get("content").and_then(Value::as_str)?;
        Some(Self::new(role, content))
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "role": self.role.as_str(),
            "content": self.content,
        })
    }
}

pub fn messages_to_value(messages: &[Message]) -> Value {
    Value::Array(messages.iter().map(Message::to_value).collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{messages_to_value, Message, Role};

    #[test]
    fn from_value_accepts_known_roles() {
        let message = Message::from_value(&json!({"role": "Assistant", "content": "hi"}));
        assert_eq!(message, Some(Message::assistant("hi")));
    }

    #[test]
    fn from_value_rejects_malformed_entries() {
        assert_eq!(Message::from_value(&json!({"role": "user"})), None);
        assert_eq!(Message::from_value(&json!({"content": "orphan"})), None);
        assert_eq!(
            Message::from_value(&json!({"role": "tool", "content": "x"})),
            None
        );
        assert_eq!(
            Message::from_value(&json!({"role": "user", "content": 42})),
            None
        );
        assert_eq!(Message::from_value(&json!("user: hi")), None);
    }

    #[test]
    fn messages_serialize_with_lowercase_roles() -> anyhow::Result<()> {
        let value = messages_to_value(&[Message::system("be brief"), Message::user("hello")]);
        assert_eq!(
            value,
            json!([
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hello"},
            ])
        );
        let parsed: Vec<Message> = serde_json::from_value(value)?;
        assert_eq!(parsed[1].role, Role::User);
        Ok(())
    }
}

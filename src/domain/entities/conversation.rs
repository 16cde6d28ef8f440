use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// The last `limit` turns of a history, oldest first. Turns with blank
/// content carry nothing for follow-up grounding and are not counted.
pub fn recent_turns(history: &[Message], limit: usize) -> Vec<&Message> {
    let mut recent: Vec<&Message> = history
        .iter()
        .rev()
        .filter(|m| !m.content.trim().is_empty())
        .take(limit)
        .collect();
    recent.reverse();
    recent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_turns_keeps_order() {
        let history = vec![
            Message::user("What is Malaria?"),
            Message::assistant("Malaria is a mosquito-borne disease."),
            Message::user("How is it treated?"),
        ];

        let recent = recent_turns(&history, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].role, MessageRole::Assistant);
        assert_eq!(recent[1].content, "How is it treated?");
    }

    #[test]
    fn test_recent_turns_skips_blank() {
        let history = vec![Message::user("hi"), Message::assistant("  ")];
        let recent = recent_turns(&history, 2);
        assert_eq!(recent.len(), 1);
        assert!(recent_turns(&history, 0).is_empty());
    }

    #[test]
    fn test_role_serde() {
        let json = serde_json::to_string(&Message::user("x")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"x"}"#);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const FAILURE_NOTICE: &str = "Something went wrong while answering your question. Please try again.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub avatar: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Append-only conversation log for one session.
#[derive(Debug, Clone, Default)]
pub struct ChatTranscript {
    messages: Vec<ChatMessage>,
}

impl ChatTranscript {
    pub fn push_user(&mut self, content: impl Into<String>) -> &ChatMessage {
        self.push(Role::User, content.into())
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) -> &ChatMessage {
        self.push(Role::Assistant, content.into())
    }

    fn push(&mut self, role: Role, content: String) -> &ChatMessage {
        self.messages.push(ChatMessage {
            role,
            content,
            avatar: None,
            sent_at: Utc::now(),
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_keeps_order() {
        let mut transcript = ChatTranscript::default();
        assert!(transcript.is_empty());
        transcript.push_user("What was Operation Barbarossa?");
        transcript.push_assistant("The German invasion of the Soviet Union.");

        let roles: Vec<Role> = transcript.messages().iter().map(|message| message.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(transcript.len(), 2);
        assert!(transcript.messages()[0].sent_at <= transcript.messages()[1].sent_at);
    }

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }
}

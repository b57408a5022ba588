use crate::domain::{AgentId, Author, Message, SessionId, SessionState, SessionStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePreviewDto {
    pub author: Author,
    pub content: String,
    pub time: Option<i64>,
}

impl From<&Message> for MessagePreviewDto {
    fn from(message: &Message) -> Self {
        Self {
            author: message.author(),
            content: message.content.clone(),
            time: message.time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionListItemDto {
    pub session_id: SessionId,
    pub display_name: Option<String>,
    pub status: Option<SessionStatus>,
    pub agent_id: Option<AgentId>,
    pub is_pinned: bool,
    pub unread: u32,
    pub last_activity: Option<i64>,
    pub last_message: Option<MessagePreviewDto>,
}

impl SessionListItemDto {
    pub fn title(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.session_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationDto {
    pub session_id: SessionId,
    pub display_name: Option<String>,
    pub state: Option<SessionState>,
    pub messages: Vec<Message>,
}

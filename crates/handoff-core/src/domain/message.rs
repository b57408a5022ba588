use crate::domain::{AgentId, MessageId, SessionId};
use crate::time::parse_backend_timestamp_ms;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const EMPTY_CONTENT_PLACEHOLDER: &str = "(empty message)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Human,
    Ai,
    Unknown,
}

impl MessageKind {
    pub fn from_type_label(label: Option<&str>) -> Self {
        match label.map(|value| value.trim().to_ascii_lowercase()) {
            Some(value) if value == "human" => MessageKind::Human,
            Some(value) if value == "ai" => MessageKind::Ai,
            _ => MessageKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
    Failed,
    Other(String),
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for DeliveryStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "sent" => DeliveryStatus::Sent,
            "delivered" => DeliveryStatus::Delivered,
            "read" => DeliveryStatus::Read,
            "failed" => DeliveryStatus::Failed,
            _ => DeliveryStatus::Other(value),
        }
    }
}

impl From<DeliveryStatus> for String {
    fn from(value: DeliveryStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// A `n8n_chat_histories` row exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessageRow {
    pub id: MessageId,
    pub session_id: SessionId,
    #[serde(default)]
    pub message: Option<MessagePayload>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub sent_by_agent: Option<bool>,
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub kind: MessageKind,
    pub content: String,
    pub time: Option<i64>,
    pub is_agent_message: bool,
    pub agent_id: Option<AgentId>,
    pub status: Option<DeliveryStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    Customer,
    Bot,
    Agent,
}

impl Author {
    pub fn label(self) -> &'static str {
        match self {
            Author::Customer => "customer",
            Author::Bot => "bot",
            Author::Agent => "agent",
        }
    }
}

impl Message {
    pub fn from_raw(row: RawMessageRow) -> Self {
        let payload = row.message.unwrap_or_default();
        let kind = MessageKind::from_type_label(payload.kind.as_deref());
        let content = match payload.content {
            Some(content) if !content.trim().is_empty() => content,
            _ => EMPTY_CONTENT_PLACEHOLDER.to_string(),
        };
        let time = match row.time.as_deref() {
            Some(raw) => {
                let parsed = parse_backend_timestamp_ms(raw);
                if parsed.is_none() {
                    tracing::warn!(message_id = %row.id, time = raw, "unparseable message time");
                }
                parsed
            }
            None => None,
        };

        Self {
            id: row.id,
            session_id: row.session_id,
            kind,
            content,
            time,
            is_agent_message: row.sent_by_agent.unwrap_or(false),
            agent_id: row.agent_id,
            status: row.status,
        }
    }

    pub fn author(&self) -> Author {
        if self.is_agent_message {
            Author::Agent
        } else if self.kind == MessageKind::Human {
            Author::Customer
        } else {
            Author::Bot
        }
    }

    pub fn is_customer_message(&self) -> bool {
        self.author() == Author::Customer
    }
}

/// Either shape a history row can arrive in; normalizing is idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionRow {
    Raw(RawMessageRow),
    Normalized(Message),
}

impl InteractionRow {
    pub fn normalize(self) -> Message {
        match self {
            InteractionRow::Raw(row) => Message::from_raw(row),
            InteractionRow::Normalized(message) => message,
        }
    }
}

impl From<RawMessageRow> for InteractionRow {
    fn from(value: RawMessageRow) -> Self {
        InteractionRow::Raw(value)
    }
}

impl From<Message> for InteractionRow {
    fn from(value: Message) -> Self {
        InteractionRow::Normalized(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

/// An agent reply is persisted before it is handed to the delivery webhook, so a
/// failed delivery still leaves the stored message behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message: Message,
    pub delivery: DeliveryOutcome,
}

impl SendReceipt {
    pub fn message_id(&self) -> MessageId {
        self.message.id
    }

    pub fn is_delivered(&self) -> bool {
        self.delivery == DeliveryOutcome::Delivered
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Author, DeliveryStatus, InteractionRow, Message, MessageKind, MessagePayload,
        RawMessageRow, EMPTY_CONTENT_PLACEHOLDER,
    };
    use crate::domain::{MessageId, SessionId};

    fn raw(kind: Option<&str>, content: Option<&str>, time: Option<&str>) -> RawMessageRow {
        RawMessageRow {
            id: MessageId(7),
            session_id: SessionId::new("5551234567").unwrap(),
            message: Some(MessagePayload {
                kind: kind.map(str::to_string),
                content: content.map(str::to_string),
            }),
            time: time.map(str::to_string),
            sent_by_agent: None,
            agent_id: None,
            status: None,
        }
    }

    #[test]
    fn missing_type_and_content_get_defaults() {
        let message = Message::from_raw(raw(None, None, None));
        assert_eq!(message.kind, MessageKind::Unknown);
        assert_eq!(message.content, EMPTY_CONTENT_PLACEHOLDER);
        assert_eq!(message.time, None);
        assert!(!message.is_agent_message);
        assert_eq!(message.author(), Author::Bot);
    }

    #[test]
    fn unparseable_time_becomes_none() {
        let message = Message::from_raw(raw(Some("human"), Some("hola"), Some("not a time")));
        assert_eq!(message.time, None);
        assert_eq!(message.author(), Author::Customer);
    }

    #[test]
    fn normalizing_twice_is_identity() {
        let once = InteractionRow::from(raw(Some("ai"), Some("hi"), Some("2024-05-01T10:00:00Z")))
            .normalize();
        let twice = InteractionRow::from(once.clone()).normalize();
        assert_eq!(once, twice);
        assert_eq!(once.time, Some(1_714_557_600_000));
    }

    #[test]
    fn row_deserializes_from_backend_json() {
        let row: RawMessageRow = serde_json::from_str(
            r#"{"id":3,"session_id":"5551234567","message":{"type":"ai","content":"ok"},"time":"2024-05-01T10:00:00+00:00","sent_by_agent":true,"agent_id":"agent-42","status":"delivered"}"#,
        )
        .unwrap();
        let message = Message::from_raw(row);
        assert_eq!(message.author(), Author::Agent);
        assert_eq!(message.status, Some(DeliveryStatus::Delivered));
    }

    #[test]
    fn unknown_delivery_status_round_trips_raw_text() {
        let status = DeliveryStatus::from("queued".to_string());
        assert_eq!(status, DeliveryStatus::Other("queued".to_string()));
        assert_eq!(String::from(status), "queued");
    }
}

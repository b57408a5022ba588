pub mod action;
pub mod auth;
pub mod change;
pub mod contact;
pub mod ids;
pub mod knowledge;
pub mod message;
pub mod phone;
pub mod profile;
pub mod session;

pub use action::AgentAction;
pub use auth::{AuthSession, AuthUser};
pub use change::ChangeEvent;
pub use contact::{session_phone_key, ContactBook, ContactRow};
pub use ids::{AgentId, MessageId, SessionId};
pub use knowledge::{knowledge_entry_for, KnowledgeEntryNew};
pub use message::{
    Author, DeliveryOutcome, DeliveryStatus, InteractionRow, Message, MessageKind,
    MessagePayload, RawMessageRow, SendReceipt, EMPTY_CONTENT_PLACEHOLDER,
};
pub use phone::normalize_phone_for_match;
pub use profile::AgentProfile;
pub use session::{SessionState, SessionStatePatch, SessionStateRow, SessionStatus, StatusLookup};

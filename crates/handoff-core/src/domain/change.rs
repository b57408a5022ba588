use crate::domain::{RawMessageRow, SessionId, SessionStatePatch};

/// A row-level change pushed by the backend change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    MessageInserted(RawMessageRow),
    SessionStateUpserted(SessionStatePatch),
    SessionStateDeleted(SessionId),
}

impl ChangeEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            ChangeEvent::MessageInserted(row) => &row.session_id,
            ChangeEvent::SessionStateUpserted(patch) => &patch.session_id,
            ChangeEvent::SessionStateDeleted(id) => id,
        }
    }
}

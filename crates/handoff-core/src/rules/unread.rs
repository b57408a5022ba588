use crate::domain::{SessionId, SessionStatus};
use std::collections::HashMap;

/// Per-session unread badge counts. Device-local.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadCounter {
    counts: HashMap<SessionId, u32>,
}

impl UnreadCounter {
    pub fn from_counts(counts: impl IntoIterator<Item = (SessionId, u32)>) -> Self {
        Self {
            counts: counts.into_iter().filter(|(_, count)| *count > 0).collect(),
        }
    }

    pub fn count(&self, session_id: &SessionId) -> u32 {
        self.counts.get(session_id).copied().unwrap_or(0)
    }

    pub fn is_unread(&self, session_id: &SessionId) -> bool {
        self.count(session_id) > 0
    }

    pub fn total(&self) -> u32 {
        self.counts.values().fold(0u32, |acc, count| acc.saturating_add(*count))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SessionId, u32)> {
        self.counts.iter().map(|(id, count)| (id, *count))
    }

    /// Counts a new message unless its session is on screen or out of the working set.
    /// Returns whether the count changed.
    pub fn record_arrival(
        &mut self,
        session_id: &SessionId,
        selected: Option<&SessionId>,
        status: Option<SessionStatus>,
    ) -> bool {
        if selected == Some(session_id) {
            return false;
        }
        if status.is_some_and(SessionStatus::is_closed) {
            return false;
        }
        let count = self.counts.entry(session_id.clone()).or_insert(0);
        *count = count.saturating_add(1);
        true
    }

    pub fn clear(&mut self, session_id: &SessionId) -> bool {
        self.counts.remove(session_id).is_some()
    }

    pub fn mark_unread(&mut self, session_id: &SessionId) -> bool {
        if self.is_unread(session_id) {
            return false;
        }
        self.counts.insert(session_id.clone(), 1);
        true
    }
}

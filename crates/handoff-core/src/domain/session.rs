use crate::domain::{AgentId, SessionId};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    BotActive,
    AgentActive,
    NeedsAgent,
    Blocked,
    Archived,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 5] = [
        SessionStatus::BotActive,
        SessionStatus::AgentActive,
        SessionStatus::NeedsAgent,
        SessionStatus::Blocked,
        SessionStatus::Archived,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::BotActive => "bot_active",
            SessionStatus::AgentActive => "agent_active",
            SessionStatus::NeedsAgent => "needs_agent",
            SessionStatus::Blocked => "blocked",
            SessionStatus::Archived => "archived",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionStatus::BotActive => "bot",
            SessionStatus::AgentActive => "agent",
            SessionStatus::NeedsAgent => "needs agent",
            SessionStatus::Blocked => "blocked",
            SessionStatus::Archived => "archived",
        }
    }

    pub fn allows_agent(self) -> bool {
        matches!(self, SessionStatus::AgentActive | SessionStatus::Blocked)
    }

    /// Archived and blocked sessions are out of the working set.
    pub fn is_closed(self) -> bool {
        matches!(self, SessionStatus::Archived | SessionStatus::Blocked)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        SessionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| CoreError::InvalidStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub status: SessionStatus,
    pub agent_id: Option<AgentId>,
    pub is_pinned: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::BotActive,
            agent_id: None,
            is_pinned: false,
            last_updated: None,
        }
    }
}

impl SessionState {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.agent_id.is_some() && !self.status.allows_agent() {
            return Err(CoreError::AgentNotAllowed(self.status));
        }
        Ok(())
    }

    pub fn pinned_in_view(&self) -> bool {
        self.is_pinned && !self.status.is_closed()
    }
}

/// Result of a point lookup; absent rows are a normal outcome for brand new sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLookup {
    Found(SessionState),
    NotFound,
}

impl StatusLookup {
    pub fn or_default(self) -> SessionState {
        match self {
            StatusLookup::Found(state) => state,
            StatusLookup::NotFound => SessionState::default(),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, StatusLookup::Found(_))
    }
}

/// A `chat_sessions_state` row as the backend returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStateRow {
    pub session_id: SessionId,
    pub status: SessionStatus,
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub is_pinned: Option<bool>,
    #[serde(default, with = "crate::time::opt_backend_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl SessionStateRow {
    pub fn into_state(self) -> (SessionId, SessionState) {
        let state = SessionState {
            status: self.status,
            agent_id: self.agent_id,
            is_pinned: self.is_pinned.unwrap_or(false),
            last_updated: self.last_updated,
        };
        (self.session_id, state)
    }
}

/// Partial row delivered by the change feed. Absent fields keep their current value;
/// `agent_id: Some(None)` is an explicit null.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionStatePatch {
    pub session_id: SessionId,
    #[serde(default)]
    pub status: Option<SessionStatus>,
    #[serde(default, deserialize_with = "present")]
    pub agent_id: Option<Option<AgentId>>,
    #[serde(default)]
    pub is_pinned: Option<bool>,
    #[serde(default, with = "crate::time::opt_backend_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl SessionStatePatch {
    pub fn apply_to(&self, state: &mut SessionState) {
        if let Some(status) = self.status {
            state.status = status;
        }
        if let Some(agent_id) = &self.agent_id {
            state.agent_id = agent_id.clone();
        }
        if let Some(pinned) = self.is_pinned {
            state.is_pinned = pinned;
        }
        if self.last_updated.is_some() {
            state.last_updated = self.last_updated;
        }
    }
}

fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::{SessionState, SessionStatePatch, SessionStateRow, SessionStatus, StatusLookup};
    use crate::domain::AgentId;
    use crate::error::CoreError;

    #[test]
    fn status_parses_labels_and_kebab_case() {
        assert_eq!(
            "needs-agent".parse::<SessionStatus>().unwrap(),
            SessionStatus::NeedsAgent
        );
        assert_eq!(
            "AGENT_ACTIVE".parse::<SessionStatus>().unwrap(),
            SessionStatus::AgentActive
        );
        assert!("paused".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn validate_rejects_agent_on_bot_session() {
        let state = SessionState {
            agent_id: Some(AgentId::new("agent-42").unwrap()),
            ..SessionState::default()
        };
        assert_eq!(
            state.validate().unwrap_err(),
            CoreError::AgentNotAllowed(SessionStatus::BotActive)
        );

        let blocked = SessionState {
            status: SessionStatus::Blocked,
            ..state
        };
        assert!(blocked.validate().is_ok());
    }

    #[test]
    fn missing_lookup_defaults_to_bot() {
        let state = StatusLookup::NotFound.or_default();
        assert_eq!(state.status, SessionStatus::BotActive);
        assert_eq!(state.agent_id, None);
        assert!(!state.is_pinned);
    }

    #[test]
    fn row_with_null_pin_and_naive_time_deserializes() {
        let row: SessionStateRow = serde_json::from_str(
            r#"{"session_id":"5551234567","status":"agent_active","agent_id":"agent-42","is_pinned":null,"last_updated":"2024-05-01T10:00:00.5"}"#,
        )
        .unwrap();
        let (id, state) = row.into_state();
        assert_eq!(id.as_str(), "5551234567");
        assert!(!state.is_pinned);
        assert_eq!(
            state.last_updated.unwrap().timestamp_millis(),
            1_714_557_600_500
        );
    }

    #[test]
    fn patch_distinguishes_null_agent_from_absent_agent() {
        let cleared: SessionStatePatch =
            serde_json::from_str(r#"{"session_id":"a","status":"bot_active","agent_id":null}"#)
                .unwrap();
        assert_eq!(cleared.agent_id, Some(None));

        let untouched: SessionStatePatch =
            serde_json::from_str(r#"{"session_id":"a","is_pinned":true}"#).unwrap();
        assert_eq!(untouched.agent_id, None);

        let mut state = SessionState {
            status: SessionStatus::AgentActive,
            agent_id: Some(AgentId::new("agent-42").unwrap()),
            ..SessionState::default()
        };
        untouched.apply_to(&mut state);
        assert!(state.is_pinned);
        assert_eq!(state.agent_id.as_ref().map(|id| id.as_str()), Some("agent-42"));

        cleared.apply_to(&mut state);
        assert_eq!(state.status, SessionStatus::BotActive);
        assert_eq!(state.agent_id, None);
        assert!(state.is_pinned);
    }
}

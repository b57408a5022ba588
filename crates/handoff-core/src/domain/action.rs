use crate::domain::{AgentId, SessionState, SessionStatus};
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle changes an agent can request for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentAction {
    TakeChat,
    ReturnToBot,
    Archive,
    Unarchive,
    Block,
    Unblock,
    Pin,
    Unpin,
}

impl AgentAction {
    pub fn verb(self) -> &'static str {
        match self {
            AgentAction::TakeChat => "take",
            AgentAction::ReturnToBot => "return to bot",
            AgentAction::Archive => "archive",
            AgentAction::Unarchive => "unarchive",
            AgentAction::Block => "block",
            AgentAction::Unblock => "unblock",
            AgentAction::Pin => "pin",
            AgentAction::Unpin => "unpin",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            AgentAction::TakeChat => "taken over",
            AgentAction::ReturnToBot => "returned to bot",
            AgentAction::Archive => "archived",
            AgentAction::Unarchive => "unarchived",
            AgentAction::Block => "blocked",
            AgentAction::Unblock => "unblocked",
            AgentAction::Pin => "pinned",
            AgentAction::Unpin => "unpinned",
        }
    }

    pub fn check(self, state: &SessionState) -> Result<(), CoreError> {
        let status = state.status;
        let allowed = match self {
            AgentAction::TakeChat | AgentAction::ReturnToBot => !status.is_closed(),
            AgentAction::Archive => status != SessionStatus::Archived,
            AgentAction::Unarchive => status == SessionStatus::Archived,
            AgentAction::Block => !status.is_closed(),
            AgentAction::Unblock => status == SessionStatus::Blocked,
            AgentAction::Pin | AgentAction::Unpin => !status.is_closed(),
        };
        if allowed {
            Ok(())
        } else {
            Err(CoreError::ActionNotAllowed {
                action: self.verb(),
                status,
            })
        }
    }

    /// The state the backend will hold once the action succeeds.
    pub fn apply(self, state: &SessionState, agent: &AgentId) -> Result<SessionState, CoreError> {
        self.check(state)?;
        let mut next = state.clone();
        match self {
            AgentAction::TakeChat => {
                next.status = SessionStatus::AgentActive;
                next.agent_id = Some(agent.clone());
            }
            AgentAction::ReturnToBot | AgentAction::Unarchive | AgentAction::Unblock => {
                next.status = SessionStatus::BotActive;
                next.agent_id = None;
            }
            AgentAction::Archive => {
                next.status = SessionStatus::Archived;
                next.agent_id = None;
                next.is_pinned = false;
            }
            AgentAction::Block => {
                next.status = SessionStatus::Blocked;
                next.agent_id = Some(agent.clone());
            }
            AgentAction::Pin => next.is_pinned = true,
            AgentAction::Unpin => next.is_pinned = false,
        }
        Ok(next)
    }
}

impl fmt::Display for AgentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

#[cfg(test)]
mod tests {
    use super::AgentAction;
    use crate::domain::{AgentId, SessionState, SessionStatus};
    use crate::error::CoreError;

    fn agent() -> AgentId {
        AgentId::new("agent-42").unwrap()
    }

    #[test]
    fn every_outcome_keeps_agent_consistency() {
        let agent = agent();
        for status in SessionStatus::ALL {
            let state = SessionState {
                status,
                agent_id: status.allows_agent().then(|| agent.clone()),
                ..SessionState::default()
            };
            for action in [
                AgentAction::TakeChat,
                AgentAction::ReturnToBot,
                AgentAction::Archive,
                AgentAction::Unarchive,
                AgentAction::Block,
                AgentAction::Unblock,
                AgentAction::Pin,
                AgentAction::Unpin,
            ] {
                if let Ok(next) = action.apply(&state, &agent) {
                    assert!(next.validate().is_ok(), "{action:?} from {status:?}");
                }
            }
        }
    }

    #[test]
    fn archive_clears_agent_and_pin() {
        let state = SessionState {
            status: SessionStatus::AgentActive,
            agent_id: Some(agent()),
            is_pinned: true,
            last_updated: None,
        };
        let next = AgentAction::Archive.apply(&state, &agent()).unwrap();
        assert_eq!(next.status, SessionStatus::Archived);
        assert_eq!(next.agent_id, None);
        assert!(!next.is_pinned);
    }

    #[test]
    fn unarchive_keeps_pin_flag() {
        let state = SessionState {
            status: SessionStatus::Archived,
            is_pinned: true,
            ..SessionState::default()
        };
        let next = AgentAction::Unarchive.apply(&state, &agent()).unwrap();
        assert_eq!(next.status, SessionStatus::BotActive);
        assert!(next.is_pinned);
    }

    #[test]
    fn closed_sessions_refuse_pin_and_takeover() {
        let archived = SessionState {
            status: SessionStatus::Archived,
            ..SessionState::default()
        };
        assert_eq!(
            AgentAction::Pin.apply(&archived, &agent()).unwrap_err(),
            CoreError::ActionNotAllowed {
                action: "pin",
                status: SessionStatus::Archived
            }
        );
        assert!(AgentAction::TakeChat.check(&archived).is_err());
        assert!(AgentAction::Unblock.check(&archived).is_err());
    }
}

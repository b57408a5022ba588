use crate::domain::SessionStatus;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("{0} cannot be empty")]
    EmptyId(&'static str),
    #[error("invalid session status: {0}")]
    InvalidStatus(String),
    #[error("invalid view filter: {0}")]
    InvalidViewFilter(String),
    #[error("agent assignment is not allowed while status is {0}")]
    AgentNotAllowed(SessionStatus),
    #[error("cannot {action} a session that is {status}")]
    ActionNotAllowed {
        action: &'static str,
        status: SessionStatus,
    },
    #[error("session not found: {0}")]
    UnknownSession(String),
    #[error("session {session} is not shown in the {view} view")]
    NotInView { session: String, view: &'static str },
    #[error("message content cannot be empty")]
    EmptyMessage,
    #[error("only agent replies can be saved as answers")]
    NotAnAgentAnswer,
    #[error("no customer question precedes this answer")]
    NoQuestionForAnswer,
    #[error("message index {0} is out of range")]
    MessageOutOfRange(usize),
}

use crate::domain::{AgentId, Author, Message, MessageId, SessionId, SessionStatus};
use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// A question/answer pair harvested from a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntryNew {
    pub question: String,
    pub answer: String,
    pub created_by_agent_id: AgentId,
    pub source_message_id: Option<MessageId>,
    pub source_session_id: Option<SessionId>,
}

impl KnowledgeEntryNew {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.question.trim().is_empty() || self.answer.trim().is_empty() {
            return Err(CoreError::EmptyMessage);
        }
        Ok(())
    }
}

/// Pairs the agent reply at `answer_index` with the closest earlier customer message.
/// Archived and blocked conversations are not harvested.
pub fn knowledge_entry_for(
    messages: &[Message],
    answer_index: usize,
    status: Option<SessionStatus>,
    agent: &AgentId,
) -> Result<KnowledgeEntryNew, CoreError> {
    if let Some(status) = status.filter(|status| status.is_closed()) {
        return Err(CoreError::ActionNotAllowed {
            action: "save answers from",
            status,
        });
    }
    let answer = messages
        .get(answer_index)
        .ok_or(CoreError::MessageOutOfRange(answer_index))?;
    if answer.author() != Author::Agent {
        return Err(CoreError::NotAnAgentAnswer);
    }

    let question = messages[..answer_index]
        .iter()
        .rev()
        .find(|message| message.is_customer_message())
        .ok_or(CoreError::NoQuestionForAnswer)?;

    let entry = KnowledgeEntryNew {
        question: question.content.trim().to_string(),
        answer: answer.content.trim().to_string(),
        created_by_agent_id: agent.clone(),
        source_message_id: Some(answer.id),
        source_session_id: Some(answer.session_id.clone()),
    };
    entry.validate()?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::knowledge_entry_for;
    use crate::domain::{AgentId, Message, MessageId, MessageKind, SessionId, SessionStatus};
    use crate::error::CoreError;

    fn message(id: i64, kind: MessageKind, agent: bool, content: &str) -> Message {
        Message {
            id: MessageId(id),
            session_id: SessionId::new("5551234567").unwrap(),
            kind,
            content: content.to_string(),
            time: Some(id * 1000),
            is_agent_message: agent,
            agent_id: None,
            status: None,
        }
    }

    #[test]
    fn picks_latest_customer_question_before_answer() {
        let messages = vec![
            message(1, MessageKind::Human, false, "first question"),
            message(2, MessageKind::Human, false, "  do you ship on sundays? "),
            message(3, MessageKind::Ai, false, "bot reply"),
            message(4, MessageKind::Ai, true, "Yes, we ship every day."),
        ];
        let agent = AgentId::new("agent-42").unwrap();
        let entry = knowledge_entry_for(&messages, 3, Some(SessionStatus::AgentActive), &agent).unwrap();
        assert_eq!(entry.question, "do you ship on sundays?");
        assert_eq!(entry.answer, "Yes, we ship every day.");
        assert_eq!(entry.source_message_id, Some(MessageId(4)));
    }

    #[test]
    fn rejects_non_agent_answers_and_missing_questions() {
        let agent = AgentId::new("agent-42").unwrap();
        let messages = vec![
            message(1, MessageKind::Ai, false, "bot greeting"),
            message(2, MessageKind::Ai, true, "agent reply"),
        ];
        assert_eq!(
            knowledge_entry_for(&messages, 0, None, &agent).unwrap_err(),
            CoreError::NotAnAgentAnswer
        );
        assert_eq!(
            knowledge_entry_for(&messages, 1, None, &agent).unwrap_err(),
            CoreError::NoQuestionForAnswer
        );
        assert_eq!(
            knowledge_entry_for(&messages, 9, None, &agent).unwrap_err(),
            CoreError::MessageOutOfRange(9)
        );
    }

    #[test]
    fn closed_conversations_are_not_harvested() {
        let agent = AgentId::new("agent-42").unwrap();
        let messages = vec![
            message(1, MessageKind::Human, false, "are you open?"),
            message(2, MessageKind::Ai, true, "Until six."),
        ];
        for status in [SessionStatus::Archived, SessionStatus::Blocked] {
            assert_eq!(
                knowledge_entry_for(&messages, 1, Some(status), &agent).unwrap_err(),
                CoreError::ActionNotAllowed {
                    action: "save answers from",
                    status,
                }
            );
        }
        assert!(knowledge_entry_for(&messages, 1, Some(SessionStatus::BotActive), &agent).is_ok());
    }
}

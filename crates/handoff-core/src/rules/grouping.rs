use crate::domain::{InteractionRow, Message, MessageId, SessionId};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGroup {
    pub session_id: SessionId,
    /// Ascending by time; messages without a time come first.
    pub messages: Vec<Message>,
    pub last_activity: Option<i64>,
}

impl SessionGroup {
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Chat history split per session, sessions ordered most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedInteractions {
    groups: Vec<SessionGroup>,
    index: HashMap<SessionId, usize>,
}

impl GroupedInteractions {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[SessionGroup] {
        &self.groups
    }

    pub fn get(&self, session_id: &SessionId) -> Option<&SessionGroup> {
        self.index.get(session_id).map(|idx| &self.groups[*idx])
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.index.contains_key(session_id)
    }

    pub fn messages(&self, session_id: &SessionId) -> &[Message] {
        self.get(session_id)
            .map(|group| group.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn last_activity(&self, session_id: &SessionId) -> Option<i64> {
        self.get(session_id).and_then(|group| group.last_activity)
    }

    pub fn session_ids(&self) -> impl Iterator<Item = &SessionId> {
        self.groups.iter().map(|group| &group.session_id)
    }

    pub fn message_count(&self) -> usize {
        self.groups.iter().map(|group| group.messages.len()).sum()
    }

    /// Adds one row and regroups everything. A row whose id is already present replaces it.
    pub fn insert(&mut self, row: impl Into<InteractionRow>) {
        let mut rows: Vec<InteractionRow> = std::mem::take(&mut self.groups)
            .into_iter()
            .flat_map(|group| group.messages)
            .map(InteractionRow::Normalized)
            .collect();
        rows.push(row.into());
        *self = group_interactions(rows);
    }
}

pub fn group_interactions<I>(rows: I) -> GroupedInteractions
where
    I: IntoIterator,
    I::Item: Into<InteractionRow>,
{
    let mut messages: Vec<Message> = Vec::new();
    let mut positions: HashMap<MessageId, usize> = HashMap::new();
    for row in rows {
        let message = row.into().normalize();
        match positions.get(&message.id) {
            Some(pos) => messages[*pos] = message,
            None => {
                positions.insert(message.id, messages.len());
                messages.push(message);
            }
        }
    }

    // stable: equal times keep arrival order
    messages.sort_by_key(|message| message.time);

    let mut groups: Vec<SessionGroup> = Vec::new();
    let mut index: HashMap<SessionId, usize> = HashMap::new();
    for message in messages {
        let idx = match index.get(&message.session_id) {
            Some(idx) => *idx,
            None => {
                index.insert(message.session_id.clone(), groups.len());
                groups.push(SessionGroup {
                    session_id: message.session_id.clone(),
                    messages: Vec::new(),
                    last_activity: None,
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];
        if message.time > group.last_activity {
            group.last_activity = message.time;
        }
        group.messages.push(message);
    }

    groups.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    let index = groups
        .iter()
        .enumerate()
        .map(|(idx, group)| (group.session_id.clone(), idx))
        .collect();

    GroupedInteractions { groups, index }
}

use crate::domain::{
    AgentAction, AgentId, ChangeEvent, ContactBook, DeliveryOutcome, RawMessageRow, SendReceipt,
    SessionId, SessionState, SessionStatus, StatusLookup,
};
use crate::dto::{ConversationDto, MessagePreviewDto, SessionListItemDto};
use crate::error::CoreError;
use crate::reducer::{RollbackOutcome, SessionStates, Snapshot};
use crate::rules::{group_interactions, rank_sessions, GroupedInteractions, RankKey};
use crate::rules::{UnreadCounter, ViewFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// An optimistic write waiting for the backend's answer.
#[derive(Debug)]
pub struct PendingAction {
    pub session_id: SessionId,
    pub action: AgentAction,
    snapshot: Snapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeEffect {
    /// A message arrived for a session whose status has never been fetched.
    pub status_lookup: Option<SessionId>,
    pub deselected: bool,
}

#[derive(Debug)]
pub struct SendCompletion {
    pub notification: Notification,
    /// Replying to a session that was waiting for an agent takes it over.
    pub take_over: Option<PendingAction>,
}

/// Client-side dashboard state. One owner applies reloads, change-feed events and
/// gateway completions in whatever order they arrive.
#[derive(Debug)]
pub struct Dashboard {
    agent: AgentId,
    view: ViewFilter,
    selected: Option<SessionId>,
    grouped: GroupedInteractions,
    states: SessionStates,
    unread: UnreadCounter,
    contacts: ContactBook,
    unread_dirty: bool,
    closed: bool,
}

impl Dashboard {
    pub fn new(agent: AgentId, view: ViewFilter) -> Self {
        Self {
            agent,
            view,
            selected: None,
            grouped: GroupedInteractions::default(),
            states: SessionStates::default(),
            unread: UnreadCounter::default(),
            contacts: ContactBook::default(),
            unread_dirty: false,
            closed: false,
        }
    }

    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    pub fn view(&self) -> ViewFilter {
        self.view
    }

    pub fn selected(&self) -> Option<&SessionId> {
        self.selected.as_ref()
    }

    pub fn grouped(&self) -> &GroupedInteractions {
        &self.grouped
    }

    pub fn states(&self) -> &SessionStates {
        &self.states
    }

    pub fn state_of(&self, session_id: &SessionId) -> Option<&SessionState> {
        self.states.get(session_id)
    }

    pub fn unread(&self) -> &UnreadCounter {
        &self.unread
    }

    pub fn contacts(&self) -> &ContactBook {
        &self.contacts
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Late completions after this are ignored.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Replaces the loaded history and returns the sessions whose status should be fetched.
    pub fn load_history(&mut self, rows: Vec<RawMessageRow>) -> Vec<SessionId> {
        if self.closed {
            return Vec::new();
        }
        self.grouped = group_interactions(rows);
        self.grouped.session_ids().cloned().collect()
    }

    pub fn hydrate_statuses(&mut self, lookups: Vec<(SessionId, StatusLookup)>) {
        self.hydrate_statuses_since(self.states.revision(), lookups);
    }

    /// Statuses fetched by a reload that started at revision `since`.
    pub fn hydrate_statuses_since(&mut self, since: u64, lookups: Vec<(SessionId, StatusLookup)>) {
        if self.closed {
            return;
        }
        self.states.hydrate_since(
            since,
            lookups
                .into_iter()
                .map(|(id, lookup)| (id, lookup.or_default())),
        );
    }

    pub fn revision(&self) -> u64 {
        self.states.revision()
    }

    pub fn on_status_lookup(&mut self, session_id: SessionId, lookup: StatusLookup) {
        if self.closed || self.states.contains(&session_id) {
            return;
        }
        self.states.insert_confirmed(session_id, lookup.or_default());
    }

    pub fn set_contacts(&mut self, contacts: ContactBook) {
        self.contacts = contacts;
    }

    pub fn set_unread(&mut self, unread: UnreadCounter) {
        self.unread = unread;
        self.unread_dirty = false;
    }

    /// True once per batch of unread changes that still need persisting.
    pub fn take_unread_dirty(&mut self) -> bool {
        std::mem::take(&mut self.unread_dirty)
    }

    pub fn set_view(&mut self, view: ViewFilter) {
        self.view = view;
        let keep = self
            .selected
            .as_ref()
            .is_some_and(|id| view.contains(self.states.status_of(id)));
        if !keep {
            self.selected = None;
        }
    }

    pub fn select(&mut self, session_id: &SessionId) -> Result<(), CoreError> {
        if !self.grouped.contains(session_id) && !self.states.contains(session_id) {
            return Err(CoreError::UnknownSession(session_id.to_string()));
        }
        if !self.view.contains(self.states.status_of(session_id)) {
            return Err(CoreError::NotInView {
                session: session_id.to_string(),
                view: self.view.as_str(),
            });
        }
        self.selected = Some(session_id.clone());
        if self.unread.clear(session_id) {
            self.unread_dirty = true;
        }
        Ok(())
    }

    pub fn deselect(&mut self) {
        self.selected = None;
    }

    pub fn mark_unread(&mut self, session_id: &SessionId) -> Result<(), CoreError> {
        if let Some(status @ SessionStatus::Archived) = self.states.status_of(session_id) {
            return Err(CoreError::ActionNotAllowed {
                action: "mark unread",
                status,
            });
        }
        if self.selected.as_ref() == Some(session_id) {
            self.selected = None;
        }
        if self.unread.mark_unread(session_id) {
            self.unread_dirty = true;
        }
        Ok(())
    }

    pub fn mark_read(&mut self, session_id: &SessionId) {
        if self.unread.clear(session_id) {
            self.unread_dirty = true;
        }
    }

    pub fn begin(
        &mut self,
        session_id: &SessionId,
        action: AgentAction,
    ) -> Result<PendingAction, CoreError> {
        let current = self.states.get(session_id).cloned().unwrap_or_default();
        let next = action.apply(&current, &self.agent)?;
        let snapshot = self
            .states
            .apply_optimistic(session_id, move |state| *state = next);
        if action == AgentAction::Archive && self.selected.as_ref() == Some(session_id) {
            self.selected = None;
        }
        Ok(PendingAction {
            session_id: session_id.clone(),
            action,
            snapshot,
        })
    }

    pub fn complete(
        &mut self,
        pending: PendingAction,
        result: Result<(), String>,
    ) -> Option<Notification> {
        if self.closed {
            return None;
        }
        let PendingAction {
            session_id,
            action,
            snapshot,
        } = pending;
        match result {
            Ok(()) => {
                self.states.confirm(snapshot);
                Some(Notification::info(format!(
                    "Chat {session_id} {}.",
                    action.past_tense()
                )))
            }
            Err(reason) => {
                let outcome = self.states.rollback(snapshot);
                tracing::debug!(session = %session_id, ?action, ?outcome, "rolled back action");
                let suffix = if outcome == RollbackOutcome::Superseded {
                    " Showing the latest server state."
                } else {
                    ""
                };
                Some(Notification::error(format!(
                    "Could not {} chat {session_id}: {reason}.{suffix}",
                    action.verb()
                )))
            }
        }
    }

    pub fn can_compose(&self, session_id: &SessionId) -> bool {
        matches!(
            self.states.status_of(session_id),
            Some(SessionStatus::AgentActive) | Some(SessionStatus::NeedsAgent)
        )
    }

    /// Checks a reply before it is handed to the gateway; returns the trimmed text.
    pub fn prepare_reply(&self, session_id: &SessionId, content: &str) -> Result<String, CoreError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(CoreError::EmptyMessage);
        }
        if !self.can_compose(session_id) {
            let status = self
                .states
                .status_of(session_id)
                .unwrap_or(SessionStatus::BotActive);
            return Err(CoreError::ActionNotAllowed {
                action: "reply to",
                status,
            });
        }
        Ok(trimmed.to_string())
    }

    pub fn complete_send(
        &mut self,
        session_id: &SessionId,
        result: Result<SendReceipt, String>,
    ) -> Option<SendCompletion> {
        if self.closed {
            return None;
        }
        let receipt = match result {
            Ok(receipt) => receipt,
            Err(reason) => {
                return Some(SendCompletion {
                    notification: Notification::error(format!("Message was not sent: {reason}")),
                    take_over: None,
                })
            }
        };

        let notification = match &receipt.delivery {
            DeliveryOutcome::Delivered => Notification::info("Message sent."),
            DeliveryOutcome::Failed(reason) => Notification::warning(format!(
                "Message saved but WhatsApp delivery failed: {reason}"
            )),
        };
        self.grouped.insert(receipt.message);

        let take_over = match self.states.status_of(session_id) {
            Some(SessionStatus::AgentActive) => None,
            _ => self.begin(session_id, AgentAction::TakeChat).ok(),
        };
        Some(SendCompletion {
            notification,
            take_over,
        })
    }

    pub fn apply_change(&mut self, change: ChangeEvent) -> ChangeEffect {
        let mut effect = ChangeEffect::default();
        if self.closed {
            return effect;
        }
        match change {
            ChangeEvent::MessageInserted(row) => {
                let session_id = row.session_id.clone();
                let status = self.states.status_of(&session_id);
                self.grouped.insert(row);
                if self
                    .unread
                    .record_arrival(&session_id, self.selected.as_ref(), status)
                {
                    self.unread_dirty = true;
                }
                if status.is_none() {
                    effect.status_lookup = Some(session_id);
                }
            }
            ChangeEvent::SessionStateUpserted(patch) => {
                self.states.merge_patch(&patch);
            }
            ChangeEvent::SessionStateDeleted(session_id) => {
                self.states.remove(&session_id);
                if self.selected.as_ref() == Some(&session_id) {
                    self.selected = None;
                    effect.deselected = true;
                }
            }
        }
        effect
    }

    pub fn visible_sessions(&self) -> Vec<SessionId> {
        let candidates = self
            .grouped
            .session_ids()
            .filter(|id| self.view.contains(self.states.status_of(id)))
            .map(|id| {
                let key = RankKey {
                    pinned: self
                        .states
                        .get(id)
                        .is_some_and(SessionState::pinned_in_view),
                    unread: self.unread.is_unread(id),
                    last_activity: self.grouped.last_activity(id),
                };
                (id.clone(), key)
            })
            .collect();
        rank_sessions(self.view, candidates)
    }

    pub fn view_counts(&self) -> Vec<(ViewFilter, usize)> {
        ViewFilter::ALL
            .into_iter()
            .map(|view| {
                let count = self
                    .grouped
                    .session_ids()
                    .filter(|id| view.contains(self.states.status_of(id)))
                    .count();
                (view, count)
            })
            .collect()
    }

    pub fn list_item(&self, session_id: &SessionId) -> SessionListItemDto {
        let state = self.states.get(session_id);
        let group = self.grouped.get(session_id);
        SessionListItemDto {
            session_id: session_id.clone(),
            display_name: self.contacts.display_name(session_id).map(str::to_string),
            status: state.map(|state| state.status),
            agent_id: state.and_then(|state| state.agent_id.clone()),
            is_pinned: state.is_some_and(|state| state.is_pinned),
            unread: self.unread.count(session_id),
            last_activity: group.and_then(|group| group.last_activity),
            last_message: group
                .and_then(|group| group.last_message())
                .map(MessagePreviewDto::from),
        }
    }

    pub fn list_items(&self) -> Vec<SessionListItemDto> {
        self.visible_sessions()
            .iter()
            .map(|id| self.list_item(id))
            .collect()
    }

    pub fn conversation(&self, session_id: &SessionId) -> Option<ConversationDto> {
        if !self.grouped.contains(session_id) && !self.states.contains(session_id) {
            return None;
        }
        Some(ConversationDto {
            session_id: session_id.clone(),
            display_name: self.contacts.display_name(session_id).map(str::to_string),
            state: self.states.get(session_id).cloned(),
            messages: self.grouped.messages(session_id).to_vec(),
        })
    }

    pub fn check_invariants(&self) -> Vec<String> {
        let mut problems: Vec<String> = self
            .states
            .violations()
            .into_iter()
            .map(|(id, err)| format!("{id}: {err}"))
            .collect();
        if let Some(selected) = &self.selected {
            if self.unread.is_unread(selected) {
                problems.push(format!("{selected}: selected session has unread messages"));
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::{Dashboard, NotificationLevel};
    use crate::domain::{
        AgentAction, AgentId, ChangeEvent, DeliveryOutcome, Message, MessageId, MessageKind,
        MessagePayload, RawMessageRow, SendReceipt, SessionId, SessionStatePatch, SessionStatus,
        StatusLookup,
    };
    use crate::error::CoreError;
    use crate::rules::ViewFilter;

    fn id(raw: &str) -> SessionId {
        SessionId::new(raw).unwrap()
    }

    fn agent() -> AgentId {
        AgentId::new("agent-42").unwrap()
    }

    fn row(msg: i64, session: &str, minute: u32) -> RawMessageRow {
        RawMessageRow {
            id: MessageId(msg),
            session_id: id(session),
            message: Some(MessagePayload {
                kind: Some("human".to_string()),
                content: Some(format!("hello {msg}")),
            }),
            time: Some(format!("2024-05-01T10:{minute:02}:00Z")),
            sent_by_agent: Some(false),
            agent_id: None,
            status: None,
        }
    }

    fn patch(session: &str, status: SessionStatus, agent: Option<AgentId>) -> SessionStatePatch {
        SessionStatePatch {
            session_id: id(session),
            status: Some(status),
            agent_id: Some(agent),
            is_pinned: None,
            last_updated: None,
        }
    }

    fn loaded(rows: Vec<RawMessageRow>) -> Dashboard {
        let mut dashboard = Dashboard::new(agent(), ViewFilter::Active);
        let ids = dashboard.load_history(rows);
        dashboard.hydrate_statuses(
            ids.into_iter()
                .map(|id| (id, StatusLookup::NotFound))
                .collect(),
        );
        dashboard
    }

    #[test]
    fn takeover_then_failed_archive_reverts_to_agent() {
        let session = id("5551234567");
        let mut dashboard = loaded(vec![row(1, "5551234567", 0)]);
        let state = dashboard.state_of(&session).unwrap();
        assert_eq!(state.status, SessionStatus::BotActive);
        assert_eq!(state.agent_id, None);

        let take = dashboard.begin(&session, AgentAction::TakeChat).unwrap();
        let note = dashboard.complete(take, Ok(())).unwrap();
        assert_eq!(note.level, NotificationLevel::Info);
        dashboard.apply_change(ChangeEvent::SessionStateUpserted(patch(
            "5551234567",
            SessionStatus::AgentActive,
            Some(agent()),
        )));
        let confirmed = dashboard.state_of(&session).unwrap().clone();
        assert_eq!(confirmed.status, SessionStatus::AgentActive);
        assert_eq!(confirmed.agent_id, Some(agent()));

        let archive = dashboard.begin(&session, AgentAction::Archive).unwrap();
        assert_eq!(
            dashboard.state_of(&session).unwrap().status,
            SessionStatus::Archived
        );
        let note = dashboard
            .complete(archive, Err("network unreachable".to_string()))
            .unwrap();
        assert_eq!(note.level, NotificationLevel::Error);
        assert_eq!(dashboard.state_of(&session), Some(&confirmed));
        assert!(dashboard.check_invariants().is_empty());
    }

    #[test]
    fn arrivals_count_unread_until_selected() {
        let mut dashboard = loaded(vec![row(1, "a", 0), row(2, "b", 1)]);
        dashboard.select(&id("a")).unwrap();

        dashboard.apply_change(ChangeEvent::MessageInserted(row(3, "a", 2)));
        dashboard.apply_change(ChangeEvent::MessageInserted(row(4, "b", 3)));
        dashboard.apply_change(ChangeEvent::MessageInserted(row(5, "b", 4)));
        assert_eq!(dashboard.unread().count(&id("a")), 0);
        assert_eq!(dashboard.unread().count(&id("b")), 2);
        assert!(dashboard.take_unread_dirty());
        assert!(!dashboard.take_unread_dirty());

        dashboard.select(&id("b")).unwrap();
        assert_eq!(dashboard.unread().count(&id("b")), 0);
        assert!(dashboard.take_unread_dirty());
    }

    #[test]
    fn message_for_unknown_session_requests_lookup() {
        let mut dashboard = loaded(vec![row(1, "a", 0)]);
        let effect = dashboard.apply_change(ChangeEvent::MessageInserted(row(2, "new", 5)));
        assert_eq!(effect.status_lookup, Some(id("new")));
        assert_eq!(dashboard.visible_sessions(), vec![id("new"), id("a")]);

        dashboard.apply_change(ChangeEvent::SessionStateUpserted(patch(
            "new",
            SessionStatus::NeedsAgent,
            None,
        )));
        dashboard.on_status_lookup(id("new"), StatusLookup::NotFound);
        assert_eq!(
            dashboard.state_of(&id("new")).unwrap().status,
            SessionStatus::NeedsAgent
        );
    }

    #[test]
    fn views_partition_and_rank_sessions() {
        let mut dashboard = loaded(vec![
            row(1, "old", 0),
            row(2, "pinned", 1),
            row(3, "needy", 2),
            row(4, "recent", 3),
        ]);
        dashboard.apply_change(ChangeEvent::SessionStateUpserted(patch(
            "needy",
            SessionStatus::NeedsAgent,
            None,
        )));
        let pin = dashboard.begin(&id("pinned"), AgentAction::Pin).unwrap();
        dashboard.complete(pin, Ok(()));

        assert_eq!(
            dashboard.visible_sessions(),
            vec![id("pinned"), id("recent"), id("old")]
        );
        dashboard.set_view(ViewFilter::NeedsAgent);
        assert_eq!(dashboard.visible_sessions(), vec![id("needy")]);
        let counts = dashboard.view_counts();
        assert_eq!(counts[0], (ViewFilter::Active, 3));
        assert_eq!(counts[1], (ViewFilter::NeedsAgent, 1));
    }

    #[test]
    fn select_refuses_sessions_outside_the_view() {
        let mut dashboard = loaded(vec![row(1, "a", 0)]);
        dashboard.apply_change(ChangeEvent::SessionStateUpserted(patch(
            "a",
            SessionStatus::Blocked,
            Some(agent()),
        )));
        assert!(matches!(
            dashboard.select(&id("a")),
            Err(CoreError::NotInView { .. })
        ));
        assert!(matches!(
            dashboard.select(&id("missing")),
            Err(CoreError::UnknownSession(_))
        ));
    }

    #[test]
    fn deleted_state_deselects() {
        let mut dashboard = loaded(vec![row(1, "a", 0)]);
        dashboard.select(&id("a")).unwrap();
        let effect = dashboard.apply_change(ChangeEvent::SessionStateDeleted(id("a")));
        assert!(effect.deselected);
        assert_eq!(dashboard.selected(), None);
        assert_eq!(dashboard.state_of(&id("a")), None);
    }

    #[test]
    fn archive_deselects_and_mark_unread_is_refused_afterwards() {
        let mut dashboard = loaded(vec![row(1, "a", 0)]);
        dashboard.select(&id("a")).unwrap();
        let archive = dashboard.begin(&id("a"), AgentAction::Archive).unwrap();
        assert_eq!(dashboard.selected(), None);
        dashboard.complete(archive, Ok(()));
        assert!(dashboard.mark_unread(&id("a")).is_err());
        assert!(dashboard.begin(&id("a"), AgentAction::Pin).is_err());
    }

    #[test]
    fn reply_to_waiting_session_takes_it_over() {
        let mut dashboard = loaded(vec![row(1, "a", 0)]);
        assert_eq!(
            dashboard.prepare_reply(&id("a"), "hi").unwrap_err(),
            CoreError::ActionNotAllowed {
                action: "reply to",
                status: SessionStatus::BotActive
            }
        );
        dashboard.apply_change(ChangeEvent::SessionStateUpserted(patch(
            "a",
            SessionStatus::NeedsAgent,
            None,
        )));
        assert_eq!(dashboard.prepare_reply(&id("a"), "  hi  ").unwrap(), "hi");

        let receipt = SendReceipt {
            message: Message {
                id: MessageId(99),
                session_id: id("a"),
                kind: MessageKind::Ai,
                content: "hi".to_string(),
                time: Some(1_714_558_000_000),
                is_agent_message: true,
                agent_id: Some(agent()),
                status: None,
            },
            delivery: DeliveryOutcome::Failed("webhook returned 502".to_string()),
        };
        let completion = dashboard.complete_send(&id("a"), Ok(receipt)).unwrap();
        assert_eq!(completion.notification.level, NotificationLevel::Warning);
        let take_over = completion.take_over.unwrap();
        assert_eq!(take_over.action, AgentAction::TakeChat);
        assert_eq!(
            dashboard.state_of(&id("a")).unwrap().status,
            SessionStatus::AgentActive
        );
        assert_eq!(dashboard.grouped().messages(&id("a")).len(), 2);
    }

    #[test]
    fn closed_dashboard_ignores_late_completions() {
        let mut dashboard = loaded(vec![row(1, "a", 0)]);
        let pending = dashboard.begin(&id("a"), AgentAction::TakeChat).unwrap();
        dashboard.close();
        assert!(dashboard.complete(pending, Err("late".to_string())).is_none());
        let effect = dashboard.apply_change(ChangeEvent::MessageInserted(row(2, "b", 1)));
        assert_eq!(effect.status_lookup, None);
        assert!(!dashboard.grouped().contains(&id("b")));
    }
}

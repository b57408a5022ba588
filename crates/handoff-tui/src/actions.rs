use anyhow::{bail, Result};
use chrono::Utc;
use handoff_core::domain::{AgentAction, ContactBook, KnowledgeEntryNew, SessionId};
use handoff_core::ViewFilter;
use handoff_gateway::RealtimeEvent;
use handoff_store::Store;
use tracing::{debug, warn};

use crate::app::{App, Mode};
use crate::worker::{DashboardEvent, Reload, Worker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Reload,
    SetView(ViewFilter),
    Open(SessionId),
    MarkRead(SessionId),
    MarkUnread(SessionId),
    Agent(SessionId, AgentAction),
    Send(SessionId, String),
    SaveKnowledge(KnowledgeEntryNew),
}

pub fn execute_action(app: &mut App, store: &Store, worker: &Worker, action: Action) -> Result<()> {
    match action {
        Action::Reload => {
            if app.reloading {
                debug!("reload already running");
                return Ok(());
            }
            app.reloading = true;
            worker.reload(app.dashboard.revision());
        }
        Action::SetView(view) => {
            app.dashboard.set_view(view);
            app.selected = 0;
            app.refresh_list();
            app.clear_error();
        }
        Action::Open(session_id) => {
            app.dashboard.select(&session_id)?;
            app.mode = Mode::Chat;
            app.cursor_to_latest();
            persist_unread(app, store)?;
            app.refresh_list();
        }
        Action::MarkRead(session_id) => {
            app.dashboard.mark_read(&session_id);
            persist_unread(app, store)?;
            app.refresh_list();
        }
        Action::MarkUnread(session_id) => {
            app.dashboard.mark_unread(&session_id)?;
            persist_unread(app, store)?;
            app.refresh_list();
        }
        Action::Agent(session_id, action) => {
            let pending = app.dashboard.begin(&session_id, action)?;
            let ticket = app.track(pending);
            worker.apply_action(ticket, session_id, action);
            app.refresh_list();
        }
        Action::Send(session_id, draft) => {
            let content = app.dashboard.prepare_reply(&session_id, &draft)?;
            worker.send(session_id, content);
            app.set_status("Sending...");
        }
        Action::SaveKnowledge(entry) => {
            entry.validate()?;
            if let Some(answer) = entry.source_message_id.filter(|answer| app.is_saved(*answer)) {
                bail!("message {answer} is already in the knowledge base");
            }
            worker.save_knowledge(entry);
            app.set_status("Saving to knowledge base...");
        }
    }
    Ok(())
}

pub fn apply_event(
    app: &mut App,
    store: &Store,
    worker: &mut Worker,
    event: DashboardEvent,
) -> Result<()> {
    match event {
        DashboardEvent::Reloaded(reload) => {
            let Reload {
                since,
                rows,
                statuses,
                contacts,
            } = *reload;
            app.reloading = false;
            app.loaded = true;
            app.dashboard.load_history(rows);
            app.dashboard.hydrate_statuses_since(since, statuses);
            if let Some(rows) = contacts {
                app.dashboard.set_contacts(ContactBook::from_rows(rows));
            }
            for problem in app.dashboard.check_invariants() {
                warn!(%problem, "session state inconsistency after reload");
            }
            app.refresh_list();
        }
        DashboardEvent::ReloadFailed(reason) => {
            app.reloading = false;
            app.set_error(format!("Could not load conversations: {reason}"));
        }
        DashboardEvent::StatusLoaded(session_id, lookup) => {
            app.dashboard.on_status_lookup(session_id, lookup);
            app.refresh_list();
        }
        DashboardEvent::ActionDone { ticket, result } => {
            let Some(pending) = app.settle(ticket) else {
                warn!(ticket, "completion for unknown action");
                return Ok(());
            };
            if let Some(notification) = app.dashboard.complete(pending, result) {
                app.notify(notification);
            }
            app.refresh_list();
        }
        DashboardEvent::MessageSent { session_id, result } => {
            if let Some(completion) = app.dashboard.complete_send(&session_id, result) {
                app.notify(completion.notification);
                if let Some(pending) = completion.take_over {
                    let action = pending.action;
                    let ticket = app.track(pending);
                    worker.apply_action(ticket, session_id, action);
                }
                app.cursor_to_latest();
            }
            app.refresh_list();
        }
        DashboardEvent::KnowledgeSaved {
            answer,
            result: Ok(question),
        } => {
            if let Some(answer) = answer {
                app.mark_saved(answer);
            }
            app.clear_error();
            app.set_status(format!("Saved to knowledge base: {question}"));
        }
        DashboardEvent::KnowledgeSaved {
            result: Err(reason),
            ..
        } => {
            app.set_error(format!("Could not save to knowledge base: {reason}"));
        }
        DashboardEvent::SessionRefreshed(Ok(session)) => {
            store.auth_session().save(Utc::now().timestamp(), &session)?;
            worker.replace_session(session);
        }
        DashboardEvent::SessionRefreshed(Err(reason)) => {
            worker.refresh_failed();
            warn!(error = %reason, "token refresh failed");
            app.set_error(format!(
                "Session could not be refreshed ({reason}); sign in again with `handoff login`."
            ));
        }
        DashboardEvent::Realtime(event) => apply_realtime(app, store, worker, event)?,
    }
    Ok(())
}

fn apply_realtime(app: &mut App, store: &Store, worker: &Worker, event: RealtimeEvent) -> Result<()> {
    match event {
        RealtimeEvent::Subscribed => {
            app.live = true;
            app.set_status("Live updates on.");
        }
        RealtimeEvent::Change(change) => {
            let was_open = app.dashboard.selected().is_some();
            let at_latest = app.message_cursor + 1 >= app.open_messages().len();
            let effect = app.dashboard.apply_change(change);
            if let Some(session_id) = effect.status_lookup {
                worker.lookup_status(session_id);
            }
            if effect.deselected && was_open {
                app.set_error("The open conversation was removed.");
            }
            if at_latest {
                app.cursor_to_latest();
            }
            persist_unread(app, store)?;
            app.refresh_list();
        }
        RealtimeEvent::ChannelError(reason) => {
            app.live = false;
            warn!(error = %reason, "realtime channel error");
            app.set_error(format!("Live updates unavailable: {reason}"));
        }
        RealtimeEvent::Closed(reason) => {
            app.live = false;
            let reason = reason.unwrap_or_else(|| "connection closed".to_string());
            warn!(%reason, "realtime channel closed");
            app.set_error(format!("Live updates stopped: {reason}"));
        }
    }
    Ok(())
}

pub fn persist_unread(app: &mut App, store: &Store) -> Result<()> {
    if app.dashboard.take_unread_dirty() {
        store.unread().save(
            Utc::now().timestamp(),
            app.dashboard.agent(),
            app.dashboard.unread(),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{apply_event, execute_action, Action};
    use crate::app::{App, Mode};
    use crate::worker::{DashboardEvent, Reload, Worker};
    use chrono::{Duration, Utc};
    use handoff_core::domain::{
        AgentAction, AgentId, AuthSession, AuthUser, ChangeEvent, KnowledgeEntryNew, MessageId,
        MessagePayload, RawMessageRow, SessionId, SessionState, SessionStatePatch, SessionStatus,
        StatusLookup,
    };
    use handoff_core::{Dashboard, ViewFilter};
    use handoff_gateway::{RealtimeEvent, RestClient};
    use handoff_store::Store;
    use tokio::sync::mpsc;
    use url::Url;

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
            sent_by_agent: None,
            agent_id: None,
            status: None,
        }
    }

    struct Harness {
        app: App,
        store: Store,
        worker: Worker,
        _runtime: tokio::runtime::Runtime,
        _events: mpsc::UnboundedReceiver<DashboardEvent>,
    }

    // The backend URL points nowhere; spawned calls fail without being awaited here.
    fn harness() -> Harness {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let base = RestClient::new(Url::parse("http://127.0.0.1:9").unwrap(), "anon").unwrap();
        let session = AuthSession {
            access_token: "token".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            user: AuthUser {
                id: agent(),
                email: None,
            },
        };
        let worker = Worker::new(runtime.handle().clone(), base, None, session, tx, 200);
        let store = Store::open_in_memory().unwrap();
        store.migrate().unwrap();
        let app = App::new(Dashboard::new(agent(), ViewFilter::Active), "Agent");
        Harness {
            app,
            store,
            worker,
            _runtime: runtime,
            _events: rx,
        }
    }

    fn reload(h: &mut Harness, statuses: Vec<(&str, SessionStatus)>) {
        let rows = vec![row(1, "5551234567", 1), row(2, "5559990000", 2)];
        let statuses = statuses
            .into_iter()
            .map(|(session, status)| {
                let agent_id = (status == SessionStatus::AgentActive).then(agent);
                (
                    id(session),
                    StatusLookup::Found(SessionState {
                        status,
                        agent_id,
                        ..SessionState::default()
                    }),
                )
            })
            .collect();
        let event = DashboardEvent::Reloaded(Box::new(Reload {
            since: h.app.dashboard.revision(),
            rows,
            statuses,
            contacts: None,
        }));
        apply_event(&mut h.app, &h.store, &mut h.worker, event).unwrap();
    }

    #[test]
    fn reload_populates_list_and_clears_flag() {
        let mut h = harness();
        h.app.reloading = true;
        reload(&mut h, vec![("5551234567", SessionStatus::BotActive)]);
        assert!(!h.app.reloading);
        assert!(h.app.loaded);
        assert_eq!(h.app.sessions.len(), 2);
    }

    #[test]
    fn slow_reload_does_not_undo_a_newer_push() {
        let mut h = harness();
        reload(&mut h, vec![("5551234567", SessionStatus::BotActive)]);
        let since = h.app.dashboard.revision();

        let push = ChangeEvent::SessionStateUpserted(SessionStatePatch {
            session_id: id("5551234567"),
            status: Some(SessionStatus::NeedsAgent),
            agent_id: None,
            is_pinned: None,
            last_updated: None,
        });
        apply_event(
            &mut h.app,
            &h.store,
            &mut h.worker,
            DashboardEvent::Realtime(RealtimeEvent::Change(push)),
        )
        .unwrap();

        let stale = DashboardEvent::Reloaded(Box::new(Reload {
            since,
            rows: vec![row(1, "5551234567", 1)],
            statuses: vec![(
                id("5551234567"),
                StatusLookup::Found(SessionState::default()),
            )],
            contacts: None,
        }));
        apply_event(&mut h.app, &h.store, &mut h.worker, stale).unwrap();
        assert_eq!(
            h.app.dashboard.states().status_of(&id("5551234567")),
            Some(SessionStatus::NeedsAgent)
        );
    }

    #[test]
    fn opening_a_session_clears_and_persists_unread() {
        let mut h = harness();
        reload(&mut h, vec![]);
        let change = ChangeEvent::MessageInserted(row(3, "5551234567", 5));
        apply_event(
            &mut h.app,
            &h.store,
            &mut h.worker,
            DashboardEvent::Realtime(RealtimeEvent::Change(change)),
        )
        .unwrap();
        assert_eq!(h.store.unread().load(&agent()).unwrap().count(&id("5551234567")), 1);

        execute_action(&mut h.app, &h.store, &h.worker, Action::Open(id("5551234567"))).unwrap();
        assert!(matches!(h.app.mode, Mode::Chat));
        assert_eq!(h.store.unread().load(&agent()).unwrap().count(&id("5551234567")), 0);
    }

    #[test]
    fn failed_action_rolls_back_and_reports() {
        let mut h = harness();
        reload(&mut h, vec![("5551234567", SessionStatus::AgentActive)]);
        execute_action(
            &mut h.app,
            &h.store,
            &h.worker,
            Action::Agent(id("5551234567"), AgentAction::Archive),
        )
        .unwrap();
        assert_eq!(
            h.app.dashboard.state_of(&id("5551234567")).map(|s| s.status),
            Some(SessionStatus::Archived)
        );
        assert_eq!(h.app.in_flight(), 1);

        let done = DashboardEvent::ActionDone {
            ticket: 1,
            result: Err("backend unavailable".to_string()),
        };
        apply_event(&mut h.app, &h.store, &mut h.worker, done).unwrap();
        let state = h.app.dashboard.state_of(&id("5551234567")).unwrap();
        assert_eq!(state.status, SessionStatus::AgentActive);
        assert_eq!(state.agent_id, Some(agent()));
        assert_eq!(h.app.in_flight(), 0);
        assert!(h.app.error.as_deref().unwrap().contains("backend unavailable"));
    }

    #[test]
    fn disallowed_action_is_rejected_before_dispatch() {
        let mut h = harness();
        reload(&mut h, vec![("5551234567", SessionStatus::Blocked)]);
        let result = execute_action(
            &mut h.app,
            &h.store,
            &h.worker,
            Action::Agent(id("5551234567"), AgentAction::Pin),
        );
        assert!(result.is_err());
        assert_eq!(h.app.in_flight(), 0);
    }

    #[test]
    fn removed_open_session_returns_to_list() {
        let mut h = harness();
        reload(&mut h, vec![("5551234567", SessionStatus::BotActive)]);
        execute_action(&mut h.app, &h.store, &h.worker, Action::Open(id("5551234567"))).unwrap();
        let change = ChangeEvent::SessionStateDeleted(id("5551234567"));
        apply_event(
            &mut h.app,
            &h.store,
            &mut h.worker,
            DashboardEvent::Realtime(RealtimeEvent::Change(change)),
        )
        .unwrap();
        assert!(matches!(h.app.mode, Mode::List));
        assert!(h.app.error.is_some());
    }

    #[test]
    fn channel_error_turns_live_indicator_off() {
        let mut h = harness();
        apply_event(
            &mut h.app,
            &h.store,
            &mut h.worker,
            DashboardEvent::Realtime(RealtimeEvent::Subscribed),
        )
        .unwrap();
        assert!(h.app.live);
        apply_event(
            &mut h.app,
            &h.store,
            &mut h.worker,
            DashboardEvent::Realtime(RealtimeEvent::ChannelError("denied".to_string())),
        )
        .unwrap();
        assert!(!h.app.live);
    }

    #[test]
    fn saved_answer_cannot_be_saved_again() {
        let mut h = harness();
        reload(&mut h, vec![("5551234567", SessionStatus::AgentActive)]);
        apply_event(
            &mut h.app,
            &h.store,
            &mut h.worker,
            DashboardEvent::KnowledgeSaved {
                answer: Some(MessageId(7)),
                result: Ok("do you ship?".to_string()),
            },
        )
        .unwrap();
        assert!(h.app.is_saved(MessageId(7)));

        let entry = KnowledgeEntryNew {
            question: "do you ship?".to_string(),
            answer: "Every day.".to_string(),
            created_by_agent_id: agent(),
            source_message_id: Some(MessageId(7)),
            source_session_id: Some(id("5551234567")),
        };
        let result = execute_action(&mut h.app, &h.store, &h.worker, Action::SaveKnowledge(entry));
        assert!(result.is_err());
    }

    #[test]
    fn refreshed_session_is_saved_and_used() {
        let mut h = harness();
        let refreshed = AuthSession {
            access_token: "token-2".to_string(),
            refresh_token: "refresh-2".to_string(),
            expires_at: Utc::now() + Duration::hours(2),
            user: AuthUser {
                id: agent(),
                email: None,
            },
        };
        apply_event(
            &mut h.app,
            &h.store,
            &mut h.worker,
            DashboardEvent::SessionRefreshed(Ok(refreshed)),
        )
        .unwrap();
        assert_eq!(h.worker.session().access_token, "token-2");
        let stored = h.store.auth_session().load().unwrap().unwrap();
        assert_eq!(stored.refresh_token, "refresh-2");
    }

    #[test]
    fn empty_reply_is_refused() {
        let mut h = harness();
        reload(&mut h, vec![("5551234567", SessionStatus::AgentActive)]);
        let result = execute_action(
            &mut h.app,
            &h.store,
            &h.worker,
            Action::Send(id("5551234567"), "   ".to_string()),
        );
        assert!(result.is_err());
    }
}

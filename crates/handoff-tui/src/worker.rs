use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use handoff_core::domain::{
    AgentAction, AgentId, AuthSession, ContactRow, KnowledgeEntryNew, MessageId, RawMessageRow,
    SendReceipt, SessionId, StatusLookup,
};
use handoff_gateway::{
    AuthClient, Gateway, RealtimeEvent, RealtimeSubscription, RestClient, SupabaseGateway,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use url::Url;

/// Refresh the access token once it expires within this margin.
const REFRESH_MARGIN_SECS: i64 = 300;

/// Everything that reaches the event loop besides key presses.
#[derive(Debug)]
pub enum DashboardEvent {
    Reloaded(Box<Reload>),
    ReloadFailed(String),
    StatusLoaded(SessionId, StatusLookup),
    ActionDone {
        ticket: u64,
        result: Result<(), String>,
    },
    MessageSent {
        session_id: SessionId,
        result: Result<SendReceipt, String>,
    },
    KnowledgeSaved {
        answer: Option<MessageId>,
        result: Result<String, String>,
    },
    SessionRefreshed(Result<AuthSession, String>),
    Realtime(RealtimeEvent),
}

#[derive(Debug)]
pub struct Reload {
    pub since: u64,
    pub rows: Vec<RawMessageRow>,
    pub statuses: Vec<(SessionId, StatusLookup)>,
    pub contacts: Option<Vec<ContactRow>>,
}

/// Runs gateway calls on the runtime and reports back over the event channel.
pub struct Worker {
    handle: Handle,
    base: RestClient,
    webhook_url: Option<Url>,
    session: AuthSession,
    gateway: Arc<SupabaseGateway>,
    events: UnboundedSender<DashboardEvent>,
    history_limit: usize,
    refreshing: bool,
    realtime: Option<RealtimeSubscription>,
}

impl Worker {
    pub fn new(
        handle: Handle,
        base: RestClient,
        webhook_url: Option<Url>,
        session: AuthSession,
        events: UnboundedSender<DashboardEvent>,
        history_limit: usize,
    ) -> Self {
        let gateway = Arc::new(build_gateway(&base, webhook_url.clone(), &session));
        Self {
            handle,
            base,
            webhook_url,
            session,
            gateway,
            events,
            history_limit,
            refreshing: false,
            realtime: None,
        }
    }

    /// Keeps the change-feed subscription so token refreshes reach it.
    pub fn attach_realtime(&mut self, subscription: RealtimeSubscription) {
        self.realtime = Some(subscription);
    }

    /// Leaves the change feed; later refreshes only touch REST calls.
    pub fn close_realtime(&mut self) {
        self.realtime = None;
    }

    pub fn agent(&self) -> &AgentId {
        self.session.agent_id()
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn gateway(&self) -> &SupabaseGateway {
        &self.gateway
    }

    pub fn events(&self) -> UnboundedSender<DashboardEvent> {
        self.events.clone()
    }

    /// `since` is the dashboard revision when the reload starts.
    pub fn reload(&self, since: u64) {
        let gateway = self.gateway.clone();
        let limit = self.history_limit;
        self.spawn(async move {
            match load_snapshot(gateway.as_ref(), limit, since).await {
                Ok(reload) => DashboardEvent::Reloaded(Box::new(reload)),
                Err(err) => DashboardEvent::ReloadFailed(err.to_string()),
            }
        });
    }

    pub fn lookup_status(&self, session_id: SessionId) {
        let gateway = self.gateway.clone();
        self.spawn(async move {
            let lookup = gateway.status_or_default(&session_id).await;
            DashboardEvent::StatusLoaded(session_id, lookup)
        });
    }

    pub fn apply_action(&self, ticket: u64, session_id: SessionId, action: AgentAction) {
        let gateway = self.gateway.clone();
        let agent = self.agent().clone();
        self.spawn(async move {
            let result = gateway
                .apply_action(&session_id, action, &agent)
                .await
                .map_err(|err| err.to_string());
            if let Err(reason) = &result {
                warn!(session = %session_id, ?action, error = %reason, "agent action failed");
            }
            DashboardEvent::ActionDone { ticket, result }
        });
    }

    pub fn send(&self, session_id: SessionId, content: String) {
        let gateway = self.gateway.clone();
        let agent = self.agent().clone();
        self.spawn(async move {
            let result = gateway
                .send_agent_message(&session_id, &content, &agent)
                .await
                .map_err(|err| err.to_string());
            DashboardEvent::MessageSent { session_id, result }
        });
    }

    pub fn save_knowledge(&self, entry: KnowledgeEntryNew) {
        let gateway = self.gateway.clone();
        self.spawn(async move {
            let answer = entry.source_message_id;
            let result = gateway
                .save_knowledge_entry(&entry)
                .await
                .map(|()| entry.question)
                .map_err(|err| err.to_string());
            DashboardEvent::KnowledgeSaved { answer, result }
        });
    }

    /// Starts a token refresh when the current one is close to expiry.
    pub fn refresh_if_due(&mut self) {
        if self.refreshing
            || !self
                .session
                .expires_within(Utc::now(), Duration::seconds(REFRESH_MARGIN_SECS))
        {
            return;
        }
        self.refreshing = true;
        let auth = AuthClient::new(self.base.clone());
        let refresh_token = self.session.refresh_token.clone();
        debug!(agent = %self.agent(), "refreshing access token");
        self.spawn(async move {
            let result = auth
                .refresh(&refresh_token)
                .await
                .map_err(|err| err.to_string());
            DashboardEvent::SessionRefreshed(result)
        });
    }

    /// Swaps in a refreshed session; later calls and the change feed carry the new token.
    pub fn replace_session(&mut self, session: AuthSession) {
        self.refreshing = false;
        self.gateway = Arc::new(build_gateway(&self.base, self.webhook_url.clone(), &session));
        if let Some(realtime) = &self.realtime {
            if let Err(err) = realtime.set_access_token(&session.access_token) {
                warn!(error = %err, "could not hand refreshed token to realtime");
            }
        }
        self.session = session;
        info!(agent = %self.agent(), "access token refreshed");
    }

    pub fn refresh_failed(&mut self) {
        self.refreshing = false;
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = DashboardEvent> + Send + 'static,
    {
        let events = self.events.clone();
        self.handle.spawn(async move {
            let event = task.await;
            if events.send(event).is_err() {
                debug!("event loop gone; dropping completion");
            }
        });
    }
}

fn build_gateway(base: &RestClient, webhook_url: Option<Url>, session: &AuthSession) -> SupabaseGateway {
    let rest = base.clone().with_access_token(session.access_token.clone());
    SupabaseGateway::new(rest, webhook_url)
}

/// History, statuses for every session in it, and contacts when available.
pub async fn load_snapshot<G: Gateway + ?Sized>(
    gateway: &G,
    limit: usize,
    since: u64,
) -> handoff_gateway::Result<Reload> {
    let rows = gateway.fetch_history(None, limit).await?;
    let mut seen = HashSet::new();
    let ids: Vec<SessionId> = rows
        .iter()
        .filter(|row| seen.insert(row.session_id.clone()))
        .map(|row| row.session_id.clone())
        .collect();
    let statuses = gateway.hydrate_statuses(ids).await;
    let contacts = match gateway.fetch_contacts().await {
        Ok(rows) => Some(rows),
        Err(err) => {
            warn!(error = %err, "contacts unavailable; showing phone numbers");
            None
        }
    };
    Ok(Reload {
        since,
        rows,
        statuses,
        contacts,
    })
}

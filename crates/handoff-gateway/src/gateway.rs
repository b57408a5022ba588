use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use handoff_core::domain::{
    AgentAction, AgentId, AgentProfile, ContactRow, DeliveryOutcome, KnowledgeEntryNew, Message,
    RawMessageRow, SendReceipt, SessionId, SessionStatus, StatusLookup,
};
use serde::Serialize;
use tracing::{debug, warn};

/// Fields written to `chat_sessions_state`. `agent_id: Some(None)` writes null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Option<AgentId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
}

impl SessionStateUpdate {
    pub fn status(status: SessionStatus, agent: Option<AgentId>) -> Self {
        Self {
            status: Some(status),
            agent_id: Some(agent),
            is_pinned: None,
        }
    }

    pub fn pinned(pinned: bool) -> Self {
        Self {
            is_pinned: Some(pinned),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenylistInsert {
    Inserted,
    AlreadyPresent,
}

/// Body posted to the workflow webhook that delivers the reply on WhatsApp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRequest {
    pub session_id: SessionId,
    pub message: String,
    pub agent_id: AgentId,
}

/// Remote data access. Implementors provide table-level calls; the compound
/// operations below are shared.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Newest `limit` rows, returned oldest first.
    async fn fetch_history(
        &self,
        session_id: Option<&SessionId>,
        limit: usize,
    ) -> Result<Vec<RawMessageRow>>;

    async fn fetch_session_status(&self, session_id: &SessionId) -> Result<StatusLookup>;

    /// Insert-or-merge keyed by session id; stamps `last_updated`.
    async fn upsert_session_state(
        &self,
        session_id: &SessionId,
        update: &SessionStateUpdate,
    ) -> Result<()>;

    /// Updates an existing row only; returns the number of rows touched.
    async fn update_session_state(
        &self,
        session_id: &SessionId,
        update: &SessionStateUpdate,
    ) -> Result<usize>;

    async fn insert_denylist(&self, session_id: &SessionId, agent: &AgentId)
        -> Result<DenylistInsert>;

    async fn delete_denylist(&self, session_id: &SessionId) -> Result<()>;

    async fn insert_agent_message(
        &self,
        session_id: &SessionId,
        content: &str,
        agent: &AgentId,
    ) -> Result<RawMessageRow>;

    fn delivery_configured(&self) -> bool;

    async fn deliver(&self, request: &DeliveryRequest) -> Result<()>;

    async fn save_knowledge_entry(&self, entry: &KnowledgeEntryNew) -> Result<()>;

    async fn fetch_contacts(&self) -> Result<Vec<ContactRow>>;

    async fn fetch_profile(&self, agent: &AgentId) -> Result<Option<AgentProfile>>;

    async fn set_password_change_flag(&self, agent: &AgentId, needs_change: bool) -> Result<()>;

    async fn set_session_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
        agent: Option<&AgentId>,
    ) -> Result<()> {
        let agent = agent.filter(|_| status.allows_agent()).cloned();
        self.upsert_session_state(session_id, &SessionStateUpdate::status(status, agent))
            .await
    }

    async fn archive(&self, session_id: &SessionId) -> Result<()> {
        let update = SessionStateUpdate {
            status: Some(SessionStatus::Archived),
            agent_id: Some(None),
            is_pinned: Some(false),
        };
        self.upsert_session_state(session_id, &update).await
    }

    async fn unarchive(&self, session_id: &SessionId) -> Result<()> {
        self.upsert_session_state(
            session_id,
            &SessionStateUpdate::status(SessionStatus::BotActive, None),
        )
        .await
    }

    async fn block(&self, session_id: &SessionId, agent: &AgentId) -> Result<()> {
        if self.insert_denylist(session_id, agent).await? == DenylistInsert::AlreadyPresent {
            debug!(session = %session_id, "session already on denylist");
        }
        self.set_session_status(session_id, SessionStatus::Blocked, Some(agent))
            .await
    }

    async fn unblock(&self, session_id: &SessionId) -> Result<()> {
        self.delete_denylist(session_id).await?;
        self.set_session_status(session_id, SessionStatus::BotActive, None)
            .await
    }

    async fn set_pinned(&self, session_id: &SessionId, pinned: bool) -> Result<()> {
        let update = SessionStateUpdate::pinned(pinned);
        if self.update_session_state(session_id, &update).await? > 0 {
            return Ok(());
        }
        // no row yet: the session is implicitly bot_active
        let create = SessionStateUpdate {
            status: Some(SessionStatus::BotActive),
            ..update
        };
        self.upsert_session_state(session_id, &create).await
    }

    async fn apply_action(
        &self,
        session_id: &SessionId,
        action: AgentAction,
        agent: &AgentId,
    ) -> Result<()> {
        match action {
            AgentAction::TakeChat => {
                self.set_session_status(session_id, SessionStatus::AgentActive, Some(agent))
                    .await
            }
            AgentAction::ReturnToBot => {
                self.set_session_status(session_id, SessionStatus::BotActive, None)
                    .await
            }
            AgentAction::Archive => self.archive(session_id).await,
            AgentAction::Unarchive => self.unarchive(session_id).await,
            AgentAction::Block => self.block(session_id, agent).await,
            AgentAction::Unblock => self.unblock(session_id).await,
            AgentAction::Pin => self.set_pinned(session_id, true).await,
            AgentAction::Unpin => self.set_pinned(session_id, false).await,
        }
    }

    /// Stores the reply, then hands it to the delivery webhook. A delivery failure
    /// after the reply is stored is reported in the receipt, not as an error.
    async fn send_agent_message(
        &self,
        session_id: &SessionId,
        content: &str,
        agent: &AgentId,
    ) -> Result<SendReceipt> {
        if !self.delivery_configured() {
            return Err(GatewayError::Config(
                "delivery webhook url is not configured".to_string(),
            ));
        }
        let row = self.insert_agent_message(session_id, content, agent).await?;
        let message = Message::from_raw(row);

        let request = DeliveryRequest {
            session_id: session_id.clone(),
            message: content.to_string(),
            agent_id: agent.clone(),
        };
        let delivery = match self.deliver(&request).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(err) => {
                warn!(session = %session_id, message_id = %message.id, error = %err, "delivery failed after message was stored");
                DeliveryOutcome::Failed(err.to_string())
            }
        };
        Ok(SendReceipt { message, delivery })
    }

    async fn status_or_default(&self, session_id: &SessionId) -> StatusLookup {
        match self.fetch_session_status(session_id).await {
            Ok(lookup) => lookup,
            Err(err) => {
                warn!(session = %session_id, error = %err, "status lookup failed; using default");
                StatusLookup::NotFound
            }
        }
    }

    async fn hydrate_statuses(&self, session_ids: Vec<SessionId>) -> Vec<(SessionId, StatusLookup)> {
        join_all(session_ids.into_iter().map(|session_id| async move {
            let lookup = self.status_or_default(&session_id).await;
            (session_id, lookup)
        }))
        .await
    }
}

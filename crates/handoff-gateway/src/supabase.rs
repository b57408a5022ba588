use crate::error::{GatewayError, Result};
use crate::gateway::{DeliveryRequest, DenylistInsert, Gateway, SessionStateUpdate};
use crate::rest::{eq, RestClient};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use handoff_core::domain::{
    AgentId, AgentProfile, ContactRow, KnowledgeEntryNew, RawMessageRow, SessionId,
    SessionStateRow, StatusLookup,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

const HISTORY_TABLE: &str = "n8n_chat_histories";
const STATE_TABLE: &str = "chat_sessions_state";
const DENYLIST_TABLE: &str = "blocked_users";
const KNOWLEDGE_TABLE: &str = "knowledge_base";
const CONTACTS_TABLE: &str = "contacts";
const PROFILES_TABLE: &str = "profiles";

#[derive(Serialize)]
struct SessionStateWrite<'a> {
    session_id: &'a SessionId,
    #[serde(flatten)]
    update: &'a SessionStateUpdate,
    last_updated: String,
}

#[derive(Debug, Clone)]
pub struct SupabaseGateway {
    rest: RestClient,
    webhook_url: Option<Url>,
}

impl SupabaseGateway {
    pub fn new(rest: RestClient, webhook_url: Option<Url>) -> Self {
        if webhook_url.is_none() {
            warn!("delivery webhook url is not configured; replies cannot be sent");
        }
        Self { rest, webhook_url }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl Gateway for SupabaseGateway {
    async fn fetch_history(
        &self,
        session_id: Option<&SessionId>,
        limit: usize,
    ) -> Result<Vec<RawMessageRow>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("order", "time.desc".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(session_id) = session_id {
            query.push(("session_id", eq(session_id)));
        }
        let mut rows: Vec<RawMessageRow> = self.rest.select(HISTORY_TABLE, &query).await?;
        rows.reverse();
        debug!(count = rows.len(), "fetched chat history");
        Ok(rows)
    }

    async fn fetch_session_status(&self, session_id: &SessionId) -> Result<StatusLookup> {
        let rows: Vec<SessionStateRow> = self
            .rest
            .select(
                STATE_TABLE,
                &[
                    (
                        "select",
                        "session_id,status,agent_id,is_pinned,last_updated".to_string(),
                    ),
                    ("session_id", eq(session_id)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(match rows.into_iter().next() {
            Some(row) => StatusLookup::Found(row.into_state().1),
            None => StatusLookup::NotFound,
        })
    }

    async fn upsert_session_state(
        &self,
        session_id: &SessionId,
        update: &SessionStateUpdate,
    ) -> Result<()> {
        let body = SessionStateWrite {
            session_id,
            update,
            last_updated: now_rfc3339(),
        };
        self.rest.upsert(STATE_TABLE, "session_id", &body).await
    }

    async fn update_session_state(
        &self,
        session_id: &SessionId,
        update: &SessionStateUpdate,
    ) -> Result<usize> {
        let body = SessionStateWrite {
            session_id,
            update,
            last_updated: now_rfc3339(),
        };
        self.rest
            .patch(STATE_TABLE, &[("session_id", eq(session_id))], &body)
            .await
    }

    async fn insert_denylist(
        &self,
        session_id: &SessionId,
        agent: &AgentId,
    ) -> Result<DenylistInsert> {
        let body = json!({
            "session_id": session_id,
            "blocked_by_agent_id": agent,
        });
        match self.rest.insert(DENYLIST_TABLE, &body).await {
            Ok(()) => Ok(DenylistInsert::Inserted),
            Err(err) if err.is_conflict() => Ok(DenylistInsert::AlreadyPresent),
            Err(err) => Err(err),
        }
    }

    async fn delete_denylist(&self, session_id: &SessionId) -> Result<()> {
        self.rest
            .delete(DENYLIST_TABLE, &[("session_id", eq(session_id))])
            .await
    }

    async fn insert_agent_message(
        &self,
        session_id: &SessionId,
        content: &str,
        agent: &AgentId,
    ) -> Result<RawMessageRow> {
        let body = json!({
            "session_id": session_id,
            "message": { "type": "ai", "content": content },
            "time": now_rfc3339(),
            "sent_by_agent": true,
            "agent_id": agent,
        });
        self.rest.insert_returning(HISTORY_TABLE, &body).await
    }

    fn delivery_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn deliver(&self, request: &DeliveryRequest) -> Result<()> {
        let url = self
            .webhook_url
            .clone()
            .ok_or_else(|| GatewayError::Config("delivery webhook url is not configured".to_string()))?;
        let response = self.rest.http().post(url).json(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(GatewayError::Delivery {
            status: status.as_u16(),
            message,
        })
    }

    async fn save_knowledge_entry(&self, entry: &KnowledgeEntryNew) -> Result<()> {
        entry.validate()?;
        self.rest.insert(KNOWLEDGE_TABLE, entry).await
    }

    async fn fetch_contacts(&self) -> Result<Vec<ContactRow>> {
        self.rest
            .select(CONTACTS_TABLE, &[("select", "*".to_string())])
            .await
    }

    async fn fetch_profile(&self, agent: &AgentId) -> Result<Option<AgentProfile>> {
        let rows: Vec<AgentProfile> = self
            .rest
            .select(
                PROFILES_TABLE,
                &[
                    (
                        "select",
                        "id,role,email,full_name,needs_password_change".to_string(),
                    ),
                    ("id", eq(agent)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn set_password_change_flag(&self, agent: &AgentId, needs_change: bool) -> Result<()> {
        let touched = self
            .rest
            .patch(
                PROFILES_TABLE,
                &[("id", eq(agent))],
                &json!({ "needs_password_change": needs_change }),
            )
            .await?;
        if touched == 0 {
            return Err(GatewayError::UnexpectedResponse(format!(
                "no profile row for {agent}"
            )));
        }
        Ok(())
    }
}

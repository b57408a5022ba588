use anyhow::{Context as _, Result};
use chrono::{Duration, Utc};
use handoff_config::AppConfig;
use handoff_core::domain::{AgentProfile, AuthSession, ContactBook, SessionId, StatusLookup};
use handoff_core::{Dashboard, ViewFilter};
use handoff_gateway::{AuthClient, Gateway, RestClient, SupabaseGateway};
use handoff_store::Store;
use serde::Serialize;
use std::io::{self, Write};
use tracing::{debug, warn};

use crate::error::CliError;
use crate::util::now_utc;

pub mod account;
pub mod actions;
pub mod completions;
pub mod conversations;
pub mod knowledge;
pub mod reply;
pub mod tui;
pub mod unread;

/// Refresh the stored session when it expires within this margin.
const REFRESH_MARGIN_SECS: i64 = 60;

pub struct Context<'a> {
    pub store: &'a Store,
    pub json: bool,
    pub config: &'a AppConfig,
}

/// A signed-in agent with a gateway carrying their token.
pub struct Connected {
    pub session: AuthSession,
    pub gateway: SupabaseGateway,
}

impl Context<'_> {
    pub fn anon_client(&self) -> Result<RestClient> {
        let backend = self.config.require_backend()?;
        Ok(RestClient::new(backend.url.clone(), backend.anon_key.clone())?)
    }

    pub fn auth(&self) -> Result<AuthClient> {
        Ok(AuthClient::new(self.anon_client()?))
    }

    /// Loads the stored session, refreshing it first when it is about to expire.
    pub async fn session(&self) -> Result<AuthSession> {
        self.config.require_backend()?;
        let stored = self
            .store
            .auth_session()
            .load()?
            .ok_or(CliError::NotSignedIn)?;
        if !stored.expires_within(Utc::now(), Duration::seconds(REFRESH_MARGIN_SECS)) {
            return Ok(stored);
        }
        debug!(agent = %stored.agent_id(), "access token expiring; refreshing");
        let refreshed = self
            .auth()?
            .refresh(&stored.refresh_token)
            .await
            .with_context(|| "refresh session")?;
        self.store.auth_session().save(now_utc(), &refreshed)?;
        Ok(refreshed)
    }

    pub async fn connect(&self) -> Result<Connected> {
        let session = self.session().await?;
        let rest = self.anon_client()?.with_access_token(session.access_token.clone());
        let gateway = SupabaseGateway::new(rest, self.config.delivery.webhook_url.clone());
        Ok(Connected { session, gateway })
    }

    /// Like `connect`, but refuses agents that still have to replace their password.
    pub async fn connect_dashboard(&self) -> Result<Connected> {
        let connected = self.connect().await?;
        let profile = connected
            .gateway
            .fetch_profile(connected.session.agent_id())
            .await
            .with_context(|| "load agent profile")?;
        if profile
            .as_ref()
            .is_some_and(|profile: &AgentProfile| profile.needs_password_change)
        {
            return Err(CliError::PasswordChangeRequired.into());
        }
        Ok(connected)
    }
}

impl Connected {
    /// Builds dashboard state for `view` from recent history, statuses, contacts and local unread counts.
    pub async fn load_dashboard(
        &self,
        ctx: &Context<'_>,
        view: ViewFilter,
        session_id: Option<&SessionId>,
        limit: usize,
    ) -> Result<Dashboard> {
        let agent = self.session.agent_id().clone();
        let mut dashboard = Dashboard::new(agent.clone(), view);

        let rows = self
            .gateway
            .fetch_history(session_id, limit)
            .await
            .with_context(|| "load chat history")?;
        let mut ids = dashboard.load_history(rows);
        if let Some(id) = session_id {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        let lookups = self.gateway.hydrate_statuses(ids).await;
        dashboard.hydrate_statuses(lookups);

        match self.gateway.fetch_contacts().await {
            Ok(rows) => dashboard.set_contacts(ContactBook::from_rows(rows)),
            Err(err) => warn!(error = %err, "contacts unavailable; showing phone numbers"),
        }
        dashboard.set_unread(ctx.store.unread().load(&agent)?);
        Ok(dashboard)
    }

    pub async fn lookup(&self, session_id: &SessionId) -> Result<StatusLookup> {
        self.gateway
            .fetch_session_status(session_id)
            .await
            .with_context(|| format!("load status of {session_id}"))
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

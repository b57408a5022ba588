use crate::commands::{print_json, Context};
use crate::util::parse_session_id;
use anyhow::{Context as _, Result};
use clap::Args;
use handoff_core::domain::{AgentAction, SessionId, SessionState};
use handoff_core::{Dashboard, ViewFilter};
use handoff_gateway::Gateway;
use serde::Serialize;

#[derive(Debug, Args)]
pub struct ActionArgs {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
struct ActionDto<'a> {
    session_id: &'a SessionId,
    action: &'static str,
    state: Option<&'a SessionState>,
}

/// Checks the action against the current server status, then writes it.
pub async fn run_action(ctx: &Context<'_>, action: AgentAction, args: ActionArgs) -> Result<()> {
    let session_id = parse_session_id(&args.session_id)?;
    let connected = ctx.connect_dashboard().await?;
    let agent = connected.session.agent_id().clone();

    let mut dashboard = Dashboard::new(agent.clone(), ViewFilter::Active);
    dashboard.on_status_lookup(session_id.clone(), connected.lookup(&session_id).await?);
    let pending = dashboard.begin(&session_id, action)?;

    let result = connected
        .gateway
        .apply_action(&session_id, action, &agent)
        .await;
    let outcome = result.as_ref().map(|_| ()).map_err(ToString::to_string);
    let notification = dashboard.complete(pending, outcome);
    result.with_context(|| format!("{} chat {session_id}", action.verb()))?;

    if ctx.json {
        return print_json(&ActionDto {
            session_id: &session_id,
            action: action.verb(),
            state: dashboard.state_of(&session_id),
        });
    }
    if let Some(notification) = notification {
        println!("{}", notification.message);
    }
    Ok(())
}

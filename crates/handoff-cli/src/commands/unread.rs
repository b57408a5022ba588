use crate::commands::{print_json, Context};
use crate::error::CliError;
use crate::util::{now_utc, parse_session_id};
use anyhow::Result;
use clap::Args;
use handoff_core::domain::{AgentId, SessionId};
use handoff_core::{Dashboard, ViewFilter};
use serde::Serialize;

#[derive(Debug, Args)]
pub struct MarkArgs {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
struct UnreadDto<'a> {
    session_id: &'a SessionId,
    unread: u32,
}

fn persist(ctx: &Context<'_>, dashboard: &mut Dashboard, session_id: &SessionId) -> Result<()> {
    let unread = dashboard.unread().count(session_id);
    if dashboard.take_unread_dirty() {
        ctx.store
            .unread()
            .set(now_utc(), dashboard.agent(), session_id, unread)?;
    }
    if ctx.json {
        return print_json(&UnreadDto { session_id, unread });
    }
    println!("{session_id}: {unread} unread");
    Ok(())
}

fn local_dashboard(ctx: &Context<'_>, agent: AgentId) -> Result<Dashboard> {
    let mut dashboard = Dashboard::new(agent, ViewFilter::Active);
    let counter = ctx.store.unread().load(dashboard.agent())?;
    dashboard.set_unread(counter);
    Ok(dashboard)
}

/// Clears the local badge; works offline.
pub fn mark_read(ctx: &Context<'_>, args: MarkArgs) -> Result<()> {
    let session_id = parse_session_id(&args.session_id)?;
    let session = ctx
        .store
        .auth_session()
        .load()?
        .ok_or(CliError::NotSignedIn)?;
    let mut dashboard = local_dashboard(ctx, session.agent_id().clone())?;
    dashboard.mark_read(&session_id);
    persist(ctx, &mut dashboard, &session_id)
}

pub async fn mark_unread(ctx: &Context<'_>, args: MarkArgs) -> Result<()> {
    let session_id = parse_session_id(&args.session_id)?;
    let connected = ctx.connect().await?;
    let mut dashboard = local_dashboard(ctx, connected.session.agent_id().clone())?;
    dashboard.on_status_lookup(session_id.clone(), connected.lookup(&session_id).await?);
    dashboard.mark_unread(&session_id)?;
    persist(ctx, &mut dashboard, &session_id)
}

use crate::commands::{print_json, Context};
use crate::error::{invalid_input, not_found};
use crate::util::{
    format_activity, format_message_time, parse_session_id, parse_view, status_label, truncate,
};
use anyhow::Result;
use clap::Args;
use handoff_config::MAX_HISTORY_LIMIT;
use handoff_core::domain::{Author, SessionId, SessionState};
use handoff_core::ViewFilter;
use serde::Serialize;

#[derive(Debug, Args)]
pub struct SessionsArgs {
    /// active | needs-agent | archived | blocked
    #[arg(long)]
    pub view: Option<String>,
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    pub session_id: String,
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
struct StatusDto<'a> {
    session_id: &'a SessionId,
    stored: bool,
    state: &'a SessionState,
}

fn resolve_limit(ctx: &Context<'_>, limit: Option<usize>) -> Result<usize> {
    match limit {
        None => Ok(ctx.config.dashboard.history_limit),
        Some(0) => Err(invalid_input("limit must be at least 1")),
        Some(value) if value > MAX_HISTORY_LIMIT => Err(invalid_input(format!(
            "limit must be at most {MAX_HISTORY_LIMIT}"
        ))),
        Some(value) => Ok(value),
    }
}

pub async fn list_sessions(ctx: &Context<'_>, args: SessionsArgs) -> Result<()> {
    let view = match args.view.as_deref() {
        Some(raw) => parse_view(raw)?,
        None => ctx.config.dashboard.default_view,
    };
    let limit = resolve_limit(ctx, args.limit)?;
    let connected = ctx.connect_dashboard().await?;
    let dashboard = connected.load_dashboard(ctx, view, None, limit).await?;
    let items = dashboard.list_items();

    if ctx.json {
        return print_json(&items);
    }

    let counts = dashboard
        .view_counts()
        .into_iter()
        .map(|(view, count)| format!("{} {count}", view.title()))
        .collect::<Vec<_>>()
        .join(" | ");
    println!("{counts}");
    if items.is_empty() {
        println!("No conversations in {}.", view.title());
        return Ok(());
    }
    for item in &items {
        let pin = if item.is_pinned && view.pins_first() { "*" } else { " " };
        let unread = if item.unread > 0 {
            format!("({})", item.unread)
        } else {
            String::new()
        };
        let preview = item
            .last_message
            .as_ref()
            .map(|message| truncate(&message.content, 48))
            .unwrap_or_default();
        println!(
            "{pin} {:<24} {:<11} {:>5} {:<12} {preview}",
            truncate(item.title(), 24),
            status_label(item.status),
            unread,
            format_activity(item.last_activity),
        );
    }
    Ok(())
}

pub async fn show_history(ctx: &Context<'_>, args: HistoryArgs) -> Result<()> {
    let session_id = parse_session_id(&args.session_id)?;
    let limit = resolve_limit(ctx, args.limit)?;
    let connected = ctx.connect_dashboard().await?;
    let dashboard = connected
        .load_dashboard(ctx, ViewFilter::Active, Some(&session_id), limit)
        .await?;
    let conversation = dashboard
        .conversation(&session_id)
        .filter(|conversation| !conversation.messages.is_empty())
        .ok_or_else(|| not_found(format!("no messages for session {session_id}")))?;

    if ctx.json {
        return print_json(&conversation);
    }

    let title = conversation
        .display_name
        .as_deref()
        .unwrap_or(session_id.as_str());
    let status = conversation.state.as_ref().map(|state| state.status);
    println!("{title} [{}]", status_label(status));
    for message in &conversation.messages {
        let author = match message.author() {
            Author::Agent => match &message.agent_id {
                Some(agent) => format!("agent {agent}"),
                None => "agent".to_string(),
            },
            other => other.label().to_string(),
        };
        println!(
            "#{:<6} {}  {:<16} {}",
            message.id,
            format_message_time(message.time),
            author,
            message.content
        );
    }
    Ok(())
}

pub async fn show_status(ctx: &Context<'_>, args: StatusArgs) -> Result<()> {
    let session_id = parse_session_id(&args.session_id)?;
    let connected = ctx.connect().await?;
    let lookup = connected.lookup(&session_id).await?;
    let stored = lookup.is_found();
    let state = lookup.or_default();

    if ctx.json {
        return print_json(&StatusDto {
            session_id: &session_id,
            stored,
            state: &state,
        });
    }
    print!("{session_id}: {}", state.status.label());
    if let Some(agent) = &state.agent_id {
        print!(" by {agent}");
    }
    if state.is_pinned {
        print!(", pinned");
    }
    if !stored {
        print!(" (no state row yet)");
    }
    println!();
    Ok(())
}

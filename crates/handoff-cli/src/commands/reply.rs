use crate::commands::{print_json, Context};
use crate::error::invalid_input;
use crate::util::parse_session_id;
use anyhow::{Context as _, Result};
use clap::Args;
use handoff_core::domain::SendReceipt;
use handoff_core::{Dashboard, NotificationLevel, ViewFilter};
use handoff_gateway::Gateway;
use serde::Serialize;

#[derive(Debug, Args)]
pub struct SendArgs {
    pub session_id: String,
    /// Message text; words are joined with spaces
    #[arg(required = true, num_args = 1..)]
    pub message: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SendDto<'a> {
    receipt: &'a SendReceipt,
    took_over: bool,
}

pub async fn send(ctx: &Context<'_>, args: SendArgs) -> Result<()> {
    let session_id = parse_session_id(&args.session_id)?;
    let draft = args.message.join(" ");
    if draft.trim().is_empty() {
        return Err(invalid_input("message cannot be empty"));
    }

    let connected = ctx.connect_dashboard().await?;
    let agent = connected.session.agent_id().clone();
    let mut dashboard = Dashboard::new(agent.clone(), ViewFilter::Active);
    dashboard.on_status_lookup(session_id.clone(), connected.lookup(&session_id).await?);
    let content = dashboard.prepare_reply(&session_id, &draft)?;

    let receipt = connected
        .gateway
        .send_agent_message(&session_id, &content, &agent)
        .await
        .with_context(|| format!("send message to {session_id}"))?;

    let Some(completion) = dashboard.complete_send(&session_id, Ok(receipt.clone())) else {
        return Ok(());
    };
    let mut took_over = false;
    if let Some(pending) = completion.take_over {
        let action = pending.action;
        let result = connected
            .gateway
            .apply_action(&session_id, action, &agent)
            .await;
        took_over = result.is_ok();
        let outcome = result.as_ref().map(|_| ()).map_err(ToString::to_string);
        if let Some(notification) = dashboard.complete(pending, outcome) {
            eprintln!("{}", notification.message);
        }
    }

    if ctx.json {
        return print_json(&SendDto {
            receipt: &receipt,
            took_over,
        });
    }
    match completion.notification.level {
        NotificationLevel::Info => println!("{}", completion.notification.message),
        NotificationLevel::Warning | NotificationLevel::Error => {
            eprintln!("warning: {}", completion.notification.message)
        }
    }
    Ok(())
}

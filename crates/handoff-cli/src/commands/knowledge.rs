use crate::commands::{print_json, Context};
use crate::error::not_found;
use crate::util::{parse_message_id, parse_session_id};
use anyhow::{Context as _, Result};
use clap::Args;
use handoff_core::domain::knowledge_entry_for;
use handoff_core::ViewFilter;
use handoff_gateway::Gateway;

#[derive(Debug, Args)]
pub struct KbSaveArgs {
    pub session_id: String,
    /// Id of the agent reply to save (shown by `handoff history`)
    #[arg(long)]
    pub message_id: String,
    /// Replace the question taken from the conversation
    #[arg(long)]
    pub question: Option<String>,
    /// Replace the answer text
    #[arg(long)]
    pub answer: Option<String>,
}

pub async fn save(ctx: &Context<'_>, args: KbSaveArgs) -> Result<()> {
    let session_id = parse_session_id(&args.session_id)?;
    let message_id = parse_message_id(&args.message_id)?;
    let connected = ctx.connect_dashboard().await?;
    let dashboard = connected
        .load_dashboard(
            ctx,
            ViewFilter::Active,
            Some(&session_id),
            ctx.config.dashboard.history_limit,
        )
        .await?;

    let messages = dashboard.grouped().messages(&session_id);
    let index = messages
        .iter()
        .position(|message| message.id == message_id)
        .ok_or_else(|| not_found(format!("message {message_id} in session {session_id}")))?;
    let mut entry = knowledge_entry_for(
        messages,
        index,
        dashboard.states().status_of(&session_id),
        dashboard.agent(),
    )?;
    if let Some(question) = args.question {
        entry.question = question.trim().to_string();
    }
    if let Some(answer) = args.answer {
        entry.answer = answer.trim().to_string();
    }
    entry.validate()?;

    connected
        .gateway
        .save_knowledge_entry(&entry)
        .await
        .with_context(|| "save knowledge entry")?;

    if ctx.json {
        return print_json(&entry);
    }
    println!("Saved to knowledge base: {}", entry.question);
    Ok(())
}

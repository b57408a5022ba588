use crate::commands::{print_json, Context};
use crate::error::invalid_input;
use crate::util::{now_utc, read_secret_line};
use anyhow::{Context as _, Result};
use clap::Args;
use handoff_core::domain::{AgentId, AgentProfile};
use handoff_gateway::Gateway;
use serde::Serialize;
use tracing::warn;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Args)]
pub struct LoginArgs {
    #[arg(long)]
    pub email: String,
}

#[derive(Debug, Args)]
pub struct ForgotPasswordArgs {
    #[arg(long)]
    pub email: String,
    /// Link target placed in the reset email
    #[arg(long)]
    pub redirect_to: Option<String>,
}

#[derive(Debug, Serialize)]
struct WhoamiDto {
    agent_id: AgentId,
    email: Option<String>,
    expires_at: i64,
    profile: Option<AgentProfile>,
}

pub async fn login(ctx: &Context<'_>, args: LoginArgs) -> Result<()> {
    let email = args.email.trim();
    if email.is_empty() {
        return Err(invalid_input("email cannot be empty"));
    }
    let password = read_secret_line("password")?;
    let session = ctx
        .auth()?
        .sign_in_password(email, &password)
        .await
        .with_context(|| "sign in")?;
    ctx.store.auth_session().save(now_utc(), &session)?;

    let connected = ctx.connect().await?;
    let profile = match connected.gateway.fetch_profile(session.agent_id()).await {
        Ok(profile) => profile,
        Err(err) => {
            warn!(error = %err, "profile unavailable after sign-in");
            None
        }
    };

    if ctx.json {
        return print_json(&WhoamiDto {
            agent_id: session.agent_id().clone(),
            email: session.user.email.clone(),
            expires_at: session.expires_at.timestamp(),
            profile,
        });
    }
    let name = profile
        .as_ref()
        .map(AgentProfile::display_name)
        .unwrap_or(email);
    println!("Signed in as {name}.");
    if profile.is_some_and(|profile| profile.needs_password_change) {
        println!("A new password is required: run `handoff set-password`.");
    }
    Ok(())
}

pub async fn logout(ctx: &Context<'_>) -> Result<()> {
    if let Some(session) = ctx.store.auth_session().load()? {
        if let Err(err) = ctx.auth()?.sign_out(&session.access_token).await {
            warn!(error = %err, "remote sign-out failed; clearing local session anyway");
        }
    }
    let removed = ctx.store.auth_session().clear()?;
    if ctx.json {
        return print_json(&serde_json::json!({ "signed_out": removed }));
    }
    if removed {
        println!("Signed out.");
    } else {
        println!("Not signed in.");
    }
    Ok(())
}

pub async fn forgot_password(ctx: &Context<'_>, args: ForgotPasswordArgs) -> Result<()> {
    let email = args.email.trim();
    if email.is_empty() {
        return Err(invalid_input("email cannot be empty"));
    }
    ctx.auth()?
        .recover(email, args.redirect_to.as_deref())
        .await
        .with_context(|| "request password reset")?;
    if ctx.json {
        return print_json(&serde_json::json!({ "sent": true, "email": email }));
    }
    println!("If {email} belongs to an agent, a reset link is on its way.");
    Ok(())
}

/// Reads the new password from stdin, updates it and clears the forced-change flag.
pub async fn set_password(ctx: &Context<'_>) -> Result<()> {
    let connected = ctx.connect().await?;
    let password = read_secret_line("new password")?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(invalid_input(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    ctx.auth()?
        .update_password(&connected.session.access_token, &password)
        .await
        .with_context(|| "update password")?;
    connected
        .gateway
        .set_password_change_flag(connected.session.agent_id(), false)
        .await
        .with_context(|| "clear password change flag")?;
    if ctx.json {
        return print_json(&serde_json::json!({ "updated": true }));
    }
    println!("Password updated.");
    Ok(())
}

pub async fn whoami(ctx: &Context<'_>) -> Result<()> {
    let connected = ctx.connect().await?;
    let session = &connected.session;
    let profile = connected
        .gateway
        .fetch_profile(session.agent_id())
        .await
        .with_context(|| "load agent profile")?;

    if ctx.json {
        return print_json(&WhoamiDto {
            agent_id: session.agent_id().clone(),
            email: session.user.email.clone(),
            expires_at: session.expires_at.timestamp(),
            profile,
        });
    }
    println!("agent: {}", session.agent_id());
    if let Some(email) = &session.user.email {
        println!("email: {email}");
    }
    if let Some(profile) = &profile {
        println!("name: {}", profile.display_name());
        if let Some(role) = &profile.role {
            println!("role: {role}");
        }
        if profile.needs_password_change {
            println!("password change required");
        }
    }
    println!(
        "token expires: {}",
        session.expires_at.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(())
}

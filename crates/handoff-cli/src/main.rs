mod commands;
mod error;
mod util;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

use crate::commands::{
    account, actions, completions, conversations, knowledge, reply, tui, unread, Context,
};
use crate::error::{exit_code_for, report_error};
use handoff_config as config;
use handoff_core::domain::AgentAction;
use handoff_store::{paths, Store};

#[derive(Debug, Parser)]
#[command(name = "handoff", version, about = "handoff CLI")]
struct Cli {
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
    /// Sign in with email and password (password read from stdin)
    Login(account::LoginArgs),
    Logout,
    #[command(name = "forgot-password")]
    ForgotPassword(account::ForgotPasswordArgs),
    #[command(name = "set-password")]
    SetPassword,
    Whoami,
    /// List conversations in one view
    Sessions(conversations::SessionsArgs),
    /// Show one conversation
    History(conversations::HistoryArgs),
    Status(conversations::StatusArgs),
    /// Take the conversation over from the bot
    Take(actions::ActionArgs),
    /// Hand the conversation back to the bot
    Release(actions::ActionArgs),
    Archive(actions::ActionArgs),
    Unarchive(actions::ActionArgs),
    Block(actions::ActionArgs),
    Unblock(actions::ActionArgs),
    Pin(actions::ActionArgs),
    Unpin(actions::ActionArgs),
    /// Reply to the customer on WhatsApp
    Send(reply::SendArgs),
    /// Save an agent answer and its question to the knowledge base
    #[command(name = "kb-save")]
    KbSave(knowledge::KbSaveArgs),
    #[command(name = "mark-read")]
    MarkRead(unread::MarkArgs),
    #[command(name = "mark-unread")]
    MarkUnread(unread::MarkArgs),
    Tui(tui::TuiArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    init_logging(verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, verbose);
            exit_code_for(&err)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let Cli {
        db_path,
        config: config_path,
        json,
        verbose,
        command,
    } = cli;

    match command {
        Command::Tui(args) => tui::launch(db_path, config_path, args, verbose),
        Command::Completions(args) => completions::emit(args),
        command => {
            let app_config = config::load(config_path.clone()).with_context(|| "load config")?;
            if verbose {
                match config::resolve_config_path(config_path.clone()) {
                    Ok(path) => {
                        if path.exists() {
                            debug!(path = %path.display(), "config resolved");
                        } else {
                            debug!(path = %path.display(), "config missing, using defaults");
                        }
                    }
                    Err(err) => {
                        debug!(error = %err, "config unavailable");
                    }
                }
            }
            let db_path =
                paths::resolve_db_path(db_path).with_context(|| "resolve database path")?;
            debug!(path = %db_path.display(), "database path resolved");

            let store = Store::open(&db_path)
                .with_context(|| format!("open database {}", db_path.display()))?;
            store.migrate().with_context(|| "run migrations")?;

            let ctx = Context {
                store: &store,
                json,
                config: &app_config,
            };

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .with_context(|| "start async runtime")?;
            runtime.block_on(dispatch(&ctx, command))
        }
    }
}

async fn dispatch(ctx: &Context<'_>, command: Command) -> Result<()> {
    match command {
        Command::Login(args) => account::login(ctx, args).await,
        Command::Logout => account::logout(ctx).await,
        Command::ForgotPassword(args) => account::forgot_password(ctx, args).await,
        Command::SetPassword => account::set_password(ctx).await,
        Command::Whoami => account::whoami(ctx).await,
        Command::Sessions(args) => conversations::list_sessions(ctx, args).await,
        Command::History(args) => conversations::show_history(ctx, args).await,
        Command::Status(args) => conversations::show_status(ctx, args).await,
        Command::Take(args) => actions::run_action(ctx, AgentAction::TakeChat, args).await,
        Command::Release(args) => actions::run_action(ctx, AgentAction::ReturnToBot, args).await,
        Command::Archive(args) => actions::run_action(ctx, AgentAction::Archive, args).await,
        Command::Unarchive(args) => actions::run_action(ctx, AgentAction::Unarchive, args).await,
        Command::Block(args) => actions::run_action(ctx, AgentAction::Block, args).await,
        Command::Unblock(args) => actions::run_action(ctx, AgentAction::Unblock, args).await,
        Command::Pin(args) => actions::run_action(ctx, AgentAction::Pin, args).await,
        Command::Unpin(args) => actions::run_action(ctx, AgentAction::Unpin, args).await,
        Command::Send(args) => reply::send(ctx, args).await,
        Command::KbSave(args) => knowledge::save(ctx, args).await,
        Command::MarkRead(args) => unread::mark_read(ctx, args),
        Command::MarkUnread(args) => unread::mark_unread(ctx, args).await,
        Command::Tui(_) => unreachable!("tui command handled before store initialization"),
        Command::Completions(_) => {
            unreachable!("completions command handled before store initialization")
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .try_init();
}

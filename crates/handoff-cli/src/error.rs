use anyhow::Error;
use handoff_config::ConfigError;
use handoff_core::CoreError;
use handoff_gateway::GatewayError;
use handoff_store::error::{StoreError, StoreErrorKind};
use std::process::ExitCode;
use thiserror::Error as ThisError;

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_NOT_FOUND: u8 = 2;
pub const EXIT_INVALID_INPUT: u8 = 3;
pub const EXIT_UNAVAILABLE: u8 = 4;

#[derive(Debug, ThisError)]
pub enum CliError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not signed in: run `handoff login --email <email>` first")]
    NotSignedIn,
    #[error("password change required: run `handoff set-password` before using the dashboard")]
    PasswordChangeRequired,
}

pub fn invalid_input(message: impl Into<String>) -> Error {
    CliError::InvalidInput(message.into()).into()
}

pub fn not_found(message: impl Into<String>) -> Error {
    CliError::NotFound(message.into()).into()
}

pub fn report_error(err: &Error, verbose: bool) {
    if verbose {
        eprintln!("error: {:#}", err);
    } else {
        eprintln!("error: {}", err);
    }
}

pub fn exit_code_for(err: &Error) -> ExitCode {
    for cause in err.chain() {
        if let Some(cli_err) = cause.downcast_ref::<CliError>() {
            return ExitCode::from(match cli_err {
                CliError::InvalidInput(_) => EXIT_INVALID_INPUT,
                CliError::NotFound(_) => EXIT_NOT_FOUND,
                CliError::NotSignedIn | CliError::PasswordChangeRequired => EXIT_UNAVAILABLE,
            });
        }
        if let Some(store_err) = cause.downcast_ref::<StoreError>() {
            return ExitCode::from(store_exit_code(store_err));
        }
        if let Some(config_err) = cause.downcast_ref::<ConfigError>() {
            return ExitCode::from(config_exit_code(config_err));
        }
        if let Some(gateway_err) = cause.downcast_ref::<GatewayError>() {
            return ExitCode::from(gateway_exit_code(gateway_err));
        }
        if let Some(_core_err) = cause.downcast_ref::<CoreError>() {
            return ExitCode::from(EXIT_INVALID_INPUT);
        }
    }
    ExitCode::from(EXIT_FAILURE)
}

fn store_exit_code(err: &StoreError) -> u8 {
    match err.kind() {
        StoreErrorKind::InvalidDataPath | StoreErrorKind::Core => EXIT_INVALID_INPUT,
        StoreErrorKind::MissingHomeDir
        | StoreErrorKind::Migration
        | StoreErrorKind::Corrupt
        | StoreErrorKind::Sql
        | StoreErrorKind::Io => EXIT_FAILURE,
    }
}

fn config_exit_code(err: &ConfigError) -> u8 {
    match err {
        ConfigError::MissingHomeDir => EXIT_FAILURE,
        ConfigError::InvalidConfigPath(_)
        | ConfigError::MissingConfigFile(_)
        | ConfigError::InsecurePermissions(_)
        | ConfigError::MissingBackend
        | ConfigError::IncompleteBackend(_)
        | ConfigError::InvalidUrl { .. }
        | ConfigError::EmptyAnonKey
        | ConfigError::InvalidHistoryLimit(_)
        | ConfigError::InvalidDefaultView(_)
        | ConfigError::Read { .. }
        | ConfigError::Parse { .. } => EXIT_UNAVAILABLE,
    }
}

fn gateway_exit_code(err: &GatewayError) -> u8 {
    if err.is_unavailable() || err.is_unauthorized() {
        return EXIT_UNAVAILABLE;
    }
    match err {
        GatewayError::Config(_) | GatewayError::Url(_) | GatewayError::ChannelClosed => {
            EXIT_UNAVAILABLE
        }
        GatewayError::Auth(_) | GatewayError::Core(_) => EXIT_INVALID_INPUT,
        GatewayError::Http(_)
        | GatewayError::Backend { .. }
        | GatewayError::Delivery { .. }
        | GatewayError::Json(_)
        | GatewayError::WebSocket(_)
        | GatewayError::UnexpectedResponse(_) => EXIT_FAILURE,
    }
}

use anyhow::{anyhow, Result};
use chrono::Utc;
use handoff_core::domain::{MessageId, SessionId, SessionStatus};
use handoff_core::rules::ViewFilter;
use handoff_core::time::{format_timestamp_ms_datetime, format_timestamp_ms_relative};
use std::io::{self, BufRead};
use std::str::FromStr;

use crate::error::invalid_input;

pub fn now_utc() -> i64 {
    Utc::now().timestamp()
}

pub fn parse_session_id(raw: &str) -> Result<SessionId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid_input("session id cannot be empty"));
    }
    SessionId::new(trimmed).map_err(|err| invalid_input(err.to_string()))
}

pub fn parse_message_id(raw: &str) -> Result<MessageId> {
    MessageId::from_str(raw.trim()).map_err(|_| invalid_input(format!("invalid message id: {raw}")))
}

pub fn parse_view(raw: &str) -> Result<ViewFilter> {
    ViewFilter::from_str(raw).map_err(|_| {
        invalid_input(format!(
            "invalid view {raw:?}: expected active|needs-agent|archived|blocked"
        ))
    })
}

pub fn status_label(status: Option<SessionStatus>) -> &'static str {
    status.map(SessionStatus::label).unwrap_or("new")
}

pub fn format_activity(ts_ms: Option<i64>) -> String {
    match ts_ms {
        Some(ts) => format_timestamp_ms_relative(ts, Utc::now()),
        None => "-".to_string(),
    }
}

pub fn format_message_time(ts_ms: Option<i64>) -> String {
    ts_ms
        .map(format_timestamp_ms_datetime)
        .unwrap_or_else(|| "????-??-?? ??:??".to_string())
}

/// Reads one line from stdin without echo handling; used for passwords piped in.
pub fn read_secret_line(label: &str) -> Result<String> {
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|err| anyhow!("read {label} from stdin: {err}"))?;
    let value = line.trim_end_matches(['\r', '\n']).to_string();
    if value.is_empty() {
        return Err(invalid_input(format!("{label} cannot be empty")));
    }
    Ok(value)
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let mut out: String = single_line.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::{parse_session_id, parse_view, truncate};
    use handoff_core::rules::ViewFilter;

    #[test]
    fn parses_views_and_session_ids() {
        assert_eq!(parse_view("needs-agent").unwrap(), ViewFilter::NeedsAgent);
        assert!(parse_view("everything").is_err());
        assert_eq!(
            parse_session_id(" 5551234567 ").unwrap().as_str(),
            "5551234567"
        );
        assert!(parse_session_id("   ").is_err());
    }

    #[test]
    fn truncate_flattens_and_shortens() {
        assert_eq!(truncate("hola\nque tal", 40), "hola que tal");
        assert_eq!(truncate("abcdefgh", 5), "abcd…");
    }
}

use chrono::Utc;
use handoff_core::domain::SessionStatus;
use handoff_core::time::{format_timestamp_ms_datetime, format_timestamp_ms_relative};

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

/// Single-line preview capped at `max_chars`, ending in an ellipsis when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let mut out: String = single_line.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Greedy word wrap by character count; words longer than `width` are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_len = 0;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let needed = if current_len == 0 {
                word.len()
            } else {
                current_len + 1 + word.len()
            };
            if needed > width {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current_len += word.len();
            current.extend(word);
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::{preview, status_label, wrap};
    use handoff_core::domain::SessionStatus;

    #[test]
    fn preview_flattens_and_cuts() {
        assert_eq!(preview("hello\n  there", 20), "hello there");
        assert_eq!(preview("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn wrap_breaks_on_words() {
        assert_eq!(wrap("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap("first\nsecond", 20), vec!["first", "second"]);
    }

    #[test]
    fn wrap_splits_long_words() {
        assert_eq!(wrap("abcdefgh ij", 3), vec!["abc", "def", "gh", "ij"]);
    }

    #[test]
    fn wrap_keeps_empty_text_visible() {
        assert_eq!(wrap("", 10), vec![String::new()]);
    }

    #[test]
    fn unknown_status_reads_as_new() {
        assert_eq!(status_label(None), "new");
        assert_eq!(status_label(Some(SessionStatus::NeedsAgent)), "needs agent");
    }
}

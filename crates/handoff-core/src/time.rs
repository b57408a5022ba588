use chrono::{DateTime, Local, NaiveDateTime, Utc};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Parses a backend timestamp. Values without an offset are taken as UTC.
pub fn parse_backend_datetime(input: &str) -> Option<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    // postgres renders offsets as +00 without minutes
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub fn parse_backend_timestamp_ms(input: &str) -> Option<i64> {
    parse_backend_datetime(input).map(|dt| dt.timestamp_millis())
}

pub fn format_timestamp_ms_time(ts_ms: i64) -> String {
    local_from_ms(ts_ms).format("%H:%M").to_string()
}

pub fn format_timestamp_ms_datetime(ts_ms: i64) -> String {
    local_from_ms(ts_ms).format("%Y-%m-%d %H:%M").to_string()
}

/// Time of day for today's messages, date and time for anything older.
pub fn format_timestamp_ms_relative(ts_ms: i64, now: DateTime<Utc>) -> String {
    let local = local_from_ms(ts_ms);
    if local.date_naive() == now.with_timezone(&Local).date_naive() {
        local.format("%H:%M").to_string()
    } else {
        local.format("%Y-%m-%d %H:%M").to_string()
    }
}

fn local_from_ms(ts_ms: i64) -> DateTime<Local> {
    DateTime::<Utc>::from_timestamp_millis(ts_ms)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .with_timezone(&Local)
}

pub mod opt_backend_timestamp {
    use super::parse_backend_datetime;
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse_backend_datetime))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        format_timestamp_ms_datetime, format_timestamp_ms_relative, parse_backend_datetime,
        parse_backend_timestamp_ms,
    };
    use chrono::{Duration, Local, TimeZone, Utc};

    #[test]
    fn parses_rfc3339_and_postgres_offsets() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(
            parse_backend_datetime("2024-05-01T12:00:00+02:00"),
            Some(expected)
        );
        assert_eq!(
            parse_backend_datetime("2024-05-01 10:00:00+00"),
            Some(expected)
        );
        assert_eq!(
            parse_backend_datetime("2024-05-01T10:00:00.000000+00:00"),
            Some(expected)
        );
    }

    #[test]
    fn naive_values_are_utc() {
        assert_eq!(
            parse_backend_timestamp_ms("2024-05-01T10:00:00"),
            Some(1_714_557_600_000)
        );
        assert_eq!(
            parse_backend_timestamp_ms("2024-05-01 10:00:00.250"),
            Some(1_714_557_600_250)
        );
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_backend_datetime(""), None);
        assert_eq!(parse_backend_datetime("yesterday"), None);
    }

    #[test]
    fn relative_format_drops_date_for_today() {
        let now = Utc::now();
        let earlier = now - Duration::days(3);
        let local = Local
            .timestamp_millis_opt(earlier.timestamp_millis())
            .unwrap();
        assert_eq!(
            format_timestamp_ms_relative(earlier.timestamp_millis(), now),
            local.format("%Y-%m-%d %H:%M").to_string()
        );
        assert_eq!(
            format_timestamp_ms_datetime(earlier.timestamp_millis()),
            local.format("%Y-%m-%d %H:%M").to_string()
        );
        assert_eq!(
            format_timestamp_ms_relative(now.timestamp_millis(), now).len(),
            5
        );
    }
}

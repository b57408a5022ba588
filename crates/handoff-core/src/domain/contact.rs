use crate::domain::{normalize_phone_for_match, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A `contacts` row: a display-name override for a phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRow {
    #[serde(alias = "phone_number")]
    pub phone: String,
    #[serde(default, alias = "name")]
    pub display_name: Option<String>,
}

/// Session ids are phone numbers, sometimes carrying a messaging suffix such as
/// `@s.whatsapp.net`. Only the digits before the suffix are compared.
pub fn session_phone_key(session_id: &SessionId) -> Option<String> {
    normalize_phone_for_match(session_id.as_str()).map(strip_plus)
}

fn strip_plus(value: String) -> String {
    match value.strip_prefix('+') {
        Some(rest) => rest.to_string(),
        None => value,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactBook {
    names: HashMap<String, String>,
}

impl ContactBook {
    pub fn from_rows(rows: impl IntoIterator<Item = ContactRow>) -> Self {
        let mut names = HashMap::new();
        for row in rows {
            let Some(name) = row
                .display_name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
            else {
                continue;
            };
            let Some(key) = normalize_phone_for_match(&row.phone).map(strip_plus) else {
                continue;
            };
            names.insert(key, name);
        }
        Self { names }
    }

    pub fn display_name(&self, session_id: &SessionId) -> Option<&str> {
        let key = session_phone_key(session_id)?;
        self.names.get(&key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

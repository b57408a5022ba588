use crate::domain::AgentId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub needs_password_change: bool,
}

impl AgentProfile {
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or(self.email.as_deref())
            .unwrap_or_else(|| self.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::AgentProfile;

    #[test]
    fn display_name_falls_back_to_email_then_id() {
        let mut profile: AgentProfile =
            serde_json::from_str(r#"{"id":"agent-42","full_name":" ","email":"a@b.c"}"#).unwrap();
        assert_eq!(profile.display_name(), "a@b.c");
        assert!(!profile.needs_password_change);
        profile.email = None;
        assert_eq!(profile.display_name(), "agent-42");
    }
}

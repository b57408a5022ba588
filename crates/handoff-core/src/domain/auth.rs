use crate::domain::AgentId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: AgentId,
    #[serde(default)]
    pub email: Option<String>,
}

/// Signed-in agent credentials as issued by the backend auth service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn agent_id(&self) -> &AgentId {
        &self.user.id
    }

    /// True when the access token expires within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at <= now + margin
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthSession, AuthUser};
    use crate::domain::AgentId;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn debug_hides_tokens_and_expiry_uses_margin() {
        let session = AuthSession {
            access_token: "secret-access".to_string(),
            refresh_token: "secret-refresh".to_string(),
            expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap(),
            user: AuthUser {
                id: AgentId::new("agent-42").unwrap(),
                email: None,
            },
        };
        let debug = format!("{session:?}");
        assert!(!debug.contains("secret"));

        let now = Utc.with_ymd_and_hms(2030, 1, 1, 11, 59, 30).unwrap();
        assert!(session.expires_within(now, Duration::seconds(60)));
        assert!(!session.expires_within(now, Duration::seconds(10)));
    }
}

use crate::error::{Result, StoreError};
use chrono::DateTime;
use handoff_core::domain::{AgentId, AuthSession, AuthUser};
use rusqlite::{params, Connection, OptionalExtension};

type AuthSessionRow = (String, Option<String>, String, String, i64);

/// The one signed-in agent on this device.
pub struct AuthSessionRepo<'a> {
    conn: &'a Connection,
}

impl<'a> AuthSessionRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn load(&self) -> Result<Option<AuthSession>> {
        let row: Option<AuthSessionRow> = self
            .conn
            .query_row(
                "SELECT user_id, email, access_token, refresh_token, expires_at
                 FROM auth_session WHERE slot = 1;",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        let Some((user_id, email, access_token, refresh_token, expires_at)) = row else {
            return Ok(None);
        };
        let expires_at = DateTime::from_timestamp(expires_at, 0)
            .ok_or_else(|| StoreError::Corrupt(format!("session expiry {expires_at}")))?;
        Ok(Some(AuthSession {
            access_token,
            refresh_token,
            expires_at,
            user: AuthUser {
                id: AgentId::new(user_id)?,
                email,
            },
        }))
    }

    pub fn save(&self, now: i64, session: &AuthSession) -> Result<()> {
        self.conn.execute(
            "INSERT INTO auth_session
             (slot, user_id, email, access_token, refresh_token, expires_at, saved_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(slot) DO UPDATE SET
               user_id = excluded.user_id,
               email = excluded.email,
               access_token = excluded.access_token,
               refresh_token = excluded.refresh_token,
               expires_at = excluded.expires_at,
               saved_at = excluded.saved_at;",
            params![
                session.user.id.as_str(),
                session.user.email,
                session.access_token,
                session.refresh_token,
                session.expires_at.timestamp(),
                now
            ],
        )?;
        Ok(())
    }

    /// Returns whether a session was stored.
    pub fn clear(&self) -> Result<bool> {
        let removed = self.conn.execute("DELETE FROM auth_session;", [])?;
        Ok(removed > 0)
    }
}

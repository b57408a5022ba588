use crate::error::{Result, StoreError};
use handoff_core::domain::{AgentId, SessionId};
use handoff_core::rules::UnreadCounter;
use rusqlite::{params, Connection};

/// Unread badge counts, kept per signed-in agent.
pub struct UnreadRepo<'a> {
    conn: &'a Connection,
}

impl<'a> UnreadRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn load(&self, agent: &AgentId) -> Result<UnreadCounter> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, count FROM unread_counts
             WHERE agent_id = ?1 AND count > 0
             ORDER BY session_id;",
        )?;
        let rows = stmt.query_map([agent.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (session, count) = row?;
            let session = SessionId::new(session)?;
            let count = u32::try_from(count)
                .map_err(|_| StoreError::Corrupt(format!("unread count {count} for {session}")))?;
            counts.push((session, count));
        }
        Ok(UnreadCounter::from_counts(counts))
    }

    /// Replaces every stored count for `agent` with the counter's contents.
    pub fn save(&self, now: i64, agent: &AgentId, counter: &UnreadCounter) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM unread_counts WHERE agent_id = ?1;",
            [agent.as_str()],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO unread_counts (agent_id, session_id, count, updated_at)
                 VALUES (?1, ?2, ?3, ?4);",
            )?;
            for (session, count) in counter.iter().filter(|(_, count)| *count > 0) {
                insert.execute(params![agent.as_str(), session.as_str(), count, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn set(&self, now: i64, agent: &AgentId, session: &SessionId, count: u32) -> Result<()> {
        if count == 0 {
            return self.clear(agent, session);
        }
        self.conn.execute(
            "INSERT INTO unread_counts (agent_id, session_id, count, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(agent_id, session_id) DO UPDATE SET
               count = excluded.count,
               updated_at = excluded.updated_at;",
            params![agent.as_str(), session.as_str(), count, now],
        )?;
        Ok(())
    }

    pub fn clear(&self, agent: &AgentId, session: &SessionId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM unread_counts WHERE agent_id = ?1 AND session_id = ?2;",
            params![agent.as_str(), session.as_str()],
        )?;
        Ok(())
    }
}

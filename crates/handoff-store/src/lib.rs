pub mod db;
pub mod error;
pub mod migrate;
pub mod paths;
pub mod repo;

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;

/// Device-local state: unread badges and the signed-in agent's session.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = db::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = db::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        migrate::run_migrations(&self.conn)
    }

    pub fn schema_version(&self) -> Result<i64> {
        migrate::schema_version(&self.conn)
    }

    pub fn unread(&self) -> repo::UnreadRepo<'_> {
        repo::UnreadRepo::new(&self.conn)
    }

    pub fn auth_session(&self) -> repo::AuthSessionRepo<'_> {
        repo::AuthSessionRepo::new(&self.conn)
    }
}

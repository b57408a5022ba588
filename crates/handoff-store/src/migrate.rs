use crate::error::{Result, StoreError};
use rusqlite::{Connection, OptionalExtension, Transaction};

const MIGRATIONS: &[(&str, &str)] = &[("001_init.sql", include_str!("../migrations/001_init.sql"))];

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    ensure_schema_table(&tx)?;
    let current = read_version(&tx)?;

    if current > MIGRATIONS.len() as i64 {
        return Err(StoreError::Migration(format!(
            "db version {} newer than available migrations {}",
            current,
            MIGRATIONS.len()
        )));
    }

    for (version, (name, sql)) in (1i64..).zip(MIGRATIONS.iter()) {
        if current >= version {
            continue;
        }
        tx.execute_batch(sql)
            .map_err(|err| StoreError::Migration(format!("{name}: {err}")))?;
        tx.execute("UPDATE handoff_schema SET version = ?1;", [version])?;
    }

    tx.commit()?;
    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<i64> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'handoff_schema');",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(0);
    }
    let version: Option<i64> = conn
        .query_row("SELECT version FROM handoff_schema LIMIT 1;", [], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(version.unwrap_or(0))
}

fn ensure_schema_table(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch("CREATE TABLE IF NOT EXISTS handoff_schema (version INTEGER NOT NULL);")?;
    let rows: i64 = tx.query_row("SELECT COUNT(*) FROM handoff_schema;", [], |row| row.get(0))?;
    match rows {
        0 => {
            tx.execute("INSERT INTO handoff_schema (version) VALUES (0);", [])?;
            Ok(())
        }
        1 => Ok(()),
        n => Err(StoreError::Migration(format!(
            "expected single schema row, found {n}"
        ))),
    }
}

fn read_version(tx: &Transaction<'_>) -> Result<i64> {
    Ok(tx.query_row("SELECT version FROM handoff_schema LIMIT 1;", [], |row| {
        row.get(0)
    })?)
}

use anyhow::{Context, Result};
use log::warn;
use rusqlite::Connection;

pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Brings the schema to the current version.
///
/// The history is a best-effort local cache: any stored version other than
/// the current one (older or newer) drops the table and starts over.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    if version != 0 {
        warn!(
            "Schema version {version} does not match {CURRENT_SCHEMA_VERSION}; discarding scan history"
        );
        tx.execute_batch("DROP TABLE IF EXISTS scan_results;")
            .context("failed to drop outdated scan_results table")?;
    }

    tx.execute_batch(include_str!("schemas/schema_v2.sql"))
        .context("failed to execute schema_v2.sql")?;

    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

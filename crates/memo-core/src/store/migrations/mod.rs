//! Document store migrations
//!
//! SQL migrations are embedded as strings and executed when the store opens.

use rusqlite::Connection;

use super::StoreResult;

/// Session and memory tables (001)
pub const DOCUMENT_TABLES_SQL: &str = include_str!("001_documents.sql");

/// Run all document store migrations
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(DOCUMENT_TABLES_SQL)?;
    Ok(())
}

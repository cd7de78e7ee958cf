//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Participant accounts, keyed by identity-derived UUID
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            identity TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Rooms, keyed by channel-derived UUID
        CREATE TABLE IF NOT EXISTS rooms (
            id TEXT PRIMARY KEY,
            channel TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Room membership
        CREATE TABLE IF NOT EXISTS participants (
            account_id TEXT NOT NULL REFERENCES accounts(id),
            room_id TEXT NOT NULL REFERENCES rooms(id),
            joined_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (account_id, room_id)
        );

        -- Conversational turns; id is derived from (channel, remote id) so
        -- redelivery collides on the primary key instead of duplicating
        CREATE TABLE IF NOT EXISTS memories (
            id TEXT PRIMARY KEY,
            agent_id TEXT NOT NULL,
            user_id TEXT NOT NULL REFERENCES accounts(id),
            room_id TEXT NOT NULL REFERENCES rooms(id),
            content TEXT NOT NULL,
            embedding BLOB,
            is_unique INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_memories_room ON memories(room_id, created_at);

        PRAGMA user_version = 1;
        ",
    )?;

    tracing::info!("migrated to schema v1");
    Ok(())
}

fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Document-knowledge fragments for semantic lookup
        CREATE TABLE IF NOT EXISTS knowledge (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            source TEXT,
            embedding BLOB NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        PRAGMA user_version = 2;
        ",
    )?;

    tracing::info!("migrated to schema v2");
    Ok(())
}

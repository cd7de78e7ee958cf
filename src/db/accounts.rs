//! Account, room, and membership repository

use uuid::Uuid;

use super::DbPool;
use crate::store::UserAccount;
use crate::{Error, Result};

/// Repository for the identity records every turn references
#[derive(Debug, Clone)]
pub struct AccountRepo {
    pool: DbPool,
}

impl AccountRepo {
    /// Create a new account repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Make sure the account row exists
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn ensure_account(&self, account: &UserAccount) -> Result<()> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        conn.execute(
            "INSERT OR IGNORE INTO accounts (id, identity) VALUES (?1, ?2)",
            rusqlite::params![account.id.to_string(), account.identity.as_str()],
        )?;
        Ok(())
    }

    /// Make sure the room row exists
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn ensure_room(&self, room_id: Uuid, channel_key: &str) -> Result<()> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        conn.execute(
            "INSERT OR IGNORE INTO rooms (id, channel) VALUES (?1, ?2)",
            rusqlite::params![room_id.to_string(), channel_key],
        )?;
        Ok(())
    }

    /// Make sure the account is a member of the room
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn ensure_participant(&self, account_id: Uuid, room_id: Uuid) -> Result<()> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        conn.execute(
            "INSERT OR IGNORE INTO participants (account_id, room_id) VALUES (?1, ?2)",
            rusqlite::params![account_id.to_string(), room_id.to_string()],
        )?;
        Ok(())
    }
}

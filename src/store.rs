//! Persistent storage seam for accounts, rooms, and conversation turns

use async_trait::async_trait;
use uuid::Uuid;

use crate::identity::Identity;
use crate::memory::Memory;
use crate::Result;

/// The account record behind a participant identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    /// Account key (UUIDv5 of the identity key)
    pub id: Uuid,
    /// The participant's identity
    pub identity: Identity,
}

impl UserAccount {
    /// Build the account record for an identity
    #[must_use]
    pub fn for_identity(identity: Identity) -> Self {
        Self { id: crate::memory::account_id(&identity), identity }
    }
}

/// Durable storage for accounts, rooms, participant links, and turns
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Idempotently ensure the account, the room (keyed by its channel
    /// string), and the participant link all exist
    async fn ensure_participant(
        &self,
        account: &UserAccount,
        room_id: Uuid,
        channel_key: &str,
    ) -> Result<()>;

    /// Write a turn; returns `false` when a row with the same id already
    /// exists (the write is skipped, not an error)
    async fn create_memory(&self, memory: &Memory) -> Result<bool>;

    /// Fetch a turn by id
    async fn get_memory(&self, id: Uuid) -> Result<Option<Memory>>;

    /// The room's most recent turns in chronological order, at most `limit`
    async fn recent_memories(&self, room_id: Uuid, limit: usize) -> Result<Vec<Memory>>;
}

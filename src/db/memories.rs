//! Turn repository and its seams into the pipeline
//!
//! One row per conversational turn, keyed by the deterministic turn id, so
//! `INSERT OR IGNORE` is the whole idempotency story. Embeddings are stored
//! next to the row and searched in process.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::accounts::AccountRepo;
use super::{embedding_from_bytes, embedding_to_bytes, DbPool};
use crate::evaluators::Evaluator;
use crate::memory::{Memory, MemoryContent};
use crate::retrieval::{cosine_similarity, Embedder, RecallSource, Scored};
use crate::state::ConversationState;
use crate::store::{MemoryStore, UserAccount};
use crate::{Error, Result};

/// Column list for all memory SELECT queries
const MEMORY_COLUMNS: &str =
    "id, agent_id, user_id, room_id, content, embedding, is_unique, created_at";

/// Map a database row to a `MemoryRow`
fn row_to_memory_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRow> {
    Ok(MemoryRow {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        user_id: row.get(2)?,
        room_id: row.get(3)?,
        content: row.get(4)?,
        embedding: row.get(5)?,
        is_unique: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Internal struct for database row mapping
struct MemoryRow {
    id: String,
    agent_id: String,
    user_id: String,
    room_id: String,
    content: String,
    embedding: Option<Vec<u8>>,
    is_unique: i32,
    created_at: String,
}

impl MemoryRow {
    fn into_memory(self) -> Result<(Memory, Option<Vec<f32>>)> {
        let content: MemoryContent = serde_json::from_str(&self.content)?;
        let memory = Memory {
            id: parse_uuid(&self.id)?,
            agent_id: parse_uuid(&self.agent_id)?,
            user_id: parse_uuid(&self.user_id)?,
            room_id: parse_uuid(&self.room_id)?,
            content,
            created_at: parse_timestamp(&self.created_at)?,
            unique: self.is_unique != 0,
        };
        Ok((memory, self.embedding.map(|b| embedding_from_bytes(&b))))
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Database(format!("corrupt uuid column: {e}")))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("corrupt timestamp column: {e}")))
}

/// Turn repository for database operations
#[derive(Debug, Clone)]
pub struct MemoryRepo {
    pool: DbPool,
}

impl MemoryRepo {
    /// Create a new turn repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a turn; returns false when a row with the same id already
    /// exists (redelivery)
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn insert(&self, memory: &Memory) -> Result<bool> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let content_json = serde_json::to_string(&memory.content)?;

        let changed = conn.execute(
            r"INSERT OR IGNORE INTO memories (id, agent_id, user_id, room_id, content, is_unique, created_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                memory.id.to_string(),
                memory.agent_id.to_string(),
                memory.user_id.to_string(),
                memory.room_id.to_string(),
                content_json,
                i32::from(memory.unique),
                memory.created_at.to_rfc3339(),
            ],
        )?;

        Ok(changed == 1)
    }

    /// Get a turn by id
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get(&self, id: Uuid) -> Result<Option<Memory>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let result = conn.query_row(
            &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
            [id.to_string()],
            row_to_memory_row,
        );

        match result {
            Ok(row) => Ok(Some(row.into_memory()?.0)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Most recent turns in a room, returned oldest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn recent(&self, room_id: Uuid, limit: usize) -> Result<Vec<Memory>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        #[allow(clippy::cast_possible_wrap)]
        let limit = limit as i64;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories
             WHERE room_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![room_id.to_string(), limit],
            row_to_memory_row,
        )?;

        let mut memories = Vec::new();
        for row in rows {
            memories.push(row?.into_memory()?.0);
        }
        memories.reverse();
        Ok(memories)
    }

    /// Attach an embedding to a stored turn
    ///
    /// A miss is fine: turns that were never persisted have nothing to
    /// attach to.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn set_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<()> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        conn.execute(
            "UPDATE memories SET embedding = ?2 WHERE id = ?1",
            rusqlite::params![id.to_string(), embedding_to_bytes(embedding)],
        )?;
        Ok(())
    }

    /// Rank a room's embedded turns against a query embedding
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn search_similar(
        &self,
        room_id: Uuid,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<Scored<Memory>>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories
             WHERE room_id = ?1 AND embedding IS NOT NULL"
        ))?;
        let rows = stmt.query_map([room_id.to_string()], row_to_memory_row)?;

        let mut scored = Vec::new();
        for row in rows {
            let (memory, embedding) = row?.into_memory()?;
            let Some(embedding) = embedding else {
                continue;
            };
            scored.push(Scored {
                score: cosine_similarity(query, &embedding),
                item: memory,
            });
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }
}

/// [`MemoryStore`] over the `SQLite` repositories
#[derive(Debug, Clone)]
pub struct SqliteStore {
    accounts: AccountRepo,
    memories: MemoryRepo,
}

impl SqliteStore {
    /// Build the store over one pool
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self {
            accounts: AccountRepo::new(pool.clone()),
            memories: MemoryRepo::new(pool),
        }
    }

    /// The underlying turn repository
    #[must_use]
    pub const fn memories(&self) -> &MemoryRepo {
        &self.memories
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    async fn ensure_participant(
        &self,
        account: &UserAccount,
        room_id: Uuid,
        channel_key: &str,
    ) -> Result<()> {
        self.accounts.ensure_account(account)?;
        self.accounts.ensure_room(room_id, channel_key)?;
        self.accounts.ensure_participant(account.id, room_id)
    }

    async fn create_memory(&self, memory: &Memory) -> Result<bool> {
        self.memories.insert(memory)
    }

    async fn get_memory(&self, id: Uuid) -> Result<Option<Memory>> {
        self.memories.get(id)
    }

    async fn recent_memories(&self, room_id: Uuid, limit: usize) -> Result<Vec<Memory>> {
        self.memories.recent(room_id, limit)
    }
}

/// Episodic recall over stored turns
pub struct SqliteRecall {
    repo: MemoryRepo,
    embedder: Arc<dyn Embedder>,
}

impl SqliteRecall {
    /// Build a recall source over the turn repository
    #[must_use]
    pub fn new(repo: MemoryRepo, embedder: Arc<dyn Embedder>) -> Self {
        Self { repo, embedder }
    }
}

#[async_trait]
impl RecallSource for SqliteRecall {
    async fn search(
        &self,
        room_id: Uuid,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Scored<Memory>>> {
        let embedding = self.embedder.embed(query).await?;
        self.repo.search_similar(room_id, &embedding, limit)
    }
}

/// Evaluator that embeds each turn so later messages can recall it
pub struct MemoryIndexer {
    repo: MemoryRepo,
    embedder: Arc<dyn Embedder>,
}

impl MemoryIndexer {
    /// Build the indexer over the turn repository
    #[must_use]
    pub fn new(repo: MemoryRepo, embedder: Arc<dyn Embedder>) -> Self {
        Self { repo, embedder }
    }
}

#[async_trait]
impl Evaluator for MemoryIndexer {
    fn name(&self) -> &'static str {
        "memory-indexer"
    }

    async fn evaluate(&self, memory: &Memory, _state: &ConversationState) -> Result<()> {
        if memory.content.text.trim().is_empty() {
            return Ok(());
        }
        let embedding = self.embedder.embed(&memory.content.text).await?;
        self.repo.set_embedding(memory.id, &embedding)
    }
}

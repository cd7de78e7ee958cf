//! Document-knowledge repository

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::{embedding_from_bytes, embedding_to_bytes, DbPool};
use crate::memory::KEY_NAMESPACE;
use crate::retrieval::{cosine_similarity, Embedder, KnowledgeFragment, KnowledgeSource, Scored};
use crate::{Error, Result};

/// Column list for all knowledge SELECT queries
const KNOWLEDGE_COLUMNS: &str = "id, text, source, embedding";

/// Fragment id, derived from the text so the same fragment never stores twice
#[must_use]
pub fn fragment_id(text: &str) -> Uuid {
    Uuid::new_v5(&KEY_NAMESPACE, text.as_bytes())
}

type FragmentRow = (String, String, Option<String>, Vec<u8>);

fn row_to_fragment(row: &rusqlite::Row<'_>) -> rusqlite::Result<FragmentRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

/// Knowledge repository for database operations
#[derive(Debug, Clone)]
pub struct KnowledgeRepo {
    pool: DbPool,
}

impl KnowledgeRepo {
    /// Create a new knowledge repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Store a fragment with its embedding; the same text replaces itself
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn upsert(&self, text: &str, source: Option<&str>, embedding: &[f32]) -> Result<Uuid> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let id = fragment_id(text);

        conn.execute(
            r"INSERT OR REPLACE INTO knowledge (id, text, source, embedding)
              VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id.to_string(), text, source, embedding_to_bytes(embedding)],
        )?;

        tracing::debug!(fragment_id = %id, "knowledge fragment stored");
        Ok(id)
    }

    /// Remove a fragment
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn delete(&self, id: Uuid) -> Result<bool> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let changed = conn.execute(
            "DELETE FROM knowledge WHERE id = ?1",
            [id.to_string()],
        )?;
        Ok(changed == 1)
    }

    /// Number of stored fragments
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn count(&self) -> Result<i64> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        Ok(conn.query_row("SELECT COUNT(*) FROM knowledge", [], |row| row.get(0))?)
    }

    /// Rank all fragments against a query embedding
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn search_similar(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<Scored<KnowledgeFragment>>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt =
            conn.prepare(&format!("SELECT {KNOWLEDGE_COLUMNS} FROM knowledge"))?;
        let rows = stmt.query_map([], row_to_fragment)?;

        let mut scored = Vec::new();
        for row in rows {
            let (id, text, source, embedding) = row?;
            let embedding = embedding_from_bytes(&embedding);
            scored.push(Scored {
                score: cosine_similarity(query, &embedding),
                item: KnowledgeFragment {
                    id: Uuid::parse_str(&id)
                        .map_err(|e| Error::Database(format!("corrupt uuid column: {e}")))?,
                    text,
                    source,
                },
            });
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }
}

/// [`KnowledgeSource`] over the knowledge repository
pub struct SqliteKnowledge {
    repo: KnowledgeRepo,
    embedder: Arc<dyn Embedder>,
}

impl SqliteKnowledge {
    /// Build a knowledge source over the repository
    #[must_use]
    pub fn new(repo: KnowledgeRepo, embedder: Arc<dyn Embedder>) -> Self {
        Self { repo, embedder }
    }
}

#[async_trait]
impl KnowledgeSource for SqliteKnowledge {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Scored<KnowledgeFragment>>> {
        let embedding = self.embedder.embed(query).await?;
        self.repo.search_similar(&embedding, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::db;

    #[test]
    fn test_same_text_upserts_in_place() {
        let pool = db::init_memory().unwrap();
        let repo = KnowledgeRepo::new(pool);

        let first = repo.upsert("the coin launched in june", None, &[1.0, 0.0]).unwrap();
        let second = repo.upsert("the coin launched in june", Some("faq"), &[1.0, 0.0]).unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_search_ranks_by_similarity() {
        let pool = db::init_memory().unwrap();
        let repo = KnowledgeRepo::new(pool);

        repo.upsert("tokenomics", None, &[1.0, 0.0]).unwrap();
        repo.upsert("team bios", None, &[0.0, 1.0]).unwrap();

        let hits = repo.search_similar(&[0.9, 0.1], 10).unwrap();
        assert_eq!(hits[0].item.text, "tokenomics");
    }

    #[test]
    fn test_delete_removes_fragment() {
        let pool = db::init_memory().unwrap();
        let repo = KnowledgeRepo::new(pool);

        let id = repo.upsert("ephemeral note", None, &[1.0]).unwrap();
        assert!(repo.delete(id).unwrap());
        assert!(!repo.delete(id).unwrap());
        assert_eq!(repo.count().unwrap(), 0);
    }
}

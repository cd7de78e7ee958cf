//! Retrieval seams: embeddings and ranked semantic search
//!
//! The composer consumes ranked result sets through these traits; ranking
//! happens behind them. Scores are cosine similarities in `[-1, 1]`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::Memory;
use crate::Result;

/// A search hit with its similarity score
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<T> {
    /// The matched item
    pub item: T,
    /// Cosine similarity against the query
    pub score: f32,
}

/// A fragment of document knowledge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeFragment {
    /// Content-derived fragment key
    pub id: Uuid,
    /// Fragment text
    pub text: String,
    /// Where the fragment came from (document name, URL)
    pub source: Option<String>,
}

/// Text embedding collaborator
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Ranked search over document knowledge
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Return up to `limit` fragments ranked by relevance to `query`
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Scored<KnowledgeFragment>>>;
}

/// Ranked search over a room's episodic memory
#[async_trait]
pub trait RecallSource: Send + Sync {
    /// Return up to `limit` past turns from `room_id` ranked by relevance
    async fn search(&self, room_id: Uuid, query: &str, limit: usize)
        -> Result<Vec<Scored<Memory>>>;
}

/// Cosine similarity between two vectors; zero for mismatched lengths or
/// degenerate norms
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|y| y * y).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

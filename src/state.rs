//! Conversation state composition
//!
//! State is ephemeral: recomputed for every inbound message, refreshed
//! mid-run after a reply is sent, and never persisted. It merges the room's
//! recent history with two independent semantic lookups (document knowledge
//! and episodic recollections), each with its own similarity threshold and
//! result cap.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::memory::Memory;
use crate::retrieval::{KnowledgeSource, RecallSource, Scored};
use crate::store::MemoryStore;
use crate::Result;

/// Everything the generation step sees about one conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState {
    /// Account key of the agent
    pub agent_id: Uuid,
    /// Display name of the agent
    pub agent_name: String,
    /// Room the conversation lives in
    pub room_id: Uuid,
    /// Recent turns, oldest first
    pub recent_messages: Vec<Memory>,
    /// Relevant document-knowledge fragments (post threshold and cap)
    pub knowledge: Vec<String>,
    /// Relevant past turns recalled from episodic memory
    pub recollections: Vec<String>,
}

impl ConversationState {
    /// A state with no history and no retrieved slices
    #[must_use]
    pub const fn empty(agent_id: Uuid, agent_name: String, room_id: Uuid) -> Self {
        Self {
            agent_id,
            agent_name,
            room_id,
            recent_messages: Vec::new(),
            knowledge: Vec::new(),
            recollections: Vec::new(),
        }
    }
}

/// Limits and thresholds for composition; the two lookups are configured
/// independently
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComposerSettings {
    /// Recent turns to load into state
    pub history_limit: usize,
    /// Document-knowledge result cap
    pub knowledge_limit: usize,
    /// Minimum similarity for a knowledge fragment to be included
    pub knowledge_threshold: f32,
    /// Episodic-recollection result cap
    pub recall_limit: usize,
    /// Minimum similarity for a recollection to be included
    pub recall_threshold: f32,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            history_limit: 20,
            knowledge_limit: 8,
            knowledge_threshold: 0.2,
            recall_limit: 10,
            recall_threshold: 0.5,
        }
    }
}

/// Builds [`ConversationState`] from the store and the two search seams
pub struct StateComposer {
    store: Arc<dyn MemoryStore>,
    knowledge: Arc<dyn KnowledgeSource>,
    recall: Arc<dyn RecallSource>,
    settings: ComposerSettings,
}

impl StateComposer {
    /// Create a composer over the given collaborators
    #[must_use]
    pub fn new(
        store: Arc<dyn MemoryStore>,
        knowledge: Arc<dyn KnowledgeSource>,
        recall: Arc<dyn RecallSource>,
        settings: ComposerSettings,
    ) -> Self {
        Self { store, knowledge, recall, settings }
    }

    /// Compose state for the turn that triggered this pipeline run
    ///
    /// Both semantic lookups are skipped entirely when the triggering turn
    /// was authored by the agent itself; history is loaded either way.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or either search collaborator fails.
    pub async fn compose(
        &self,
        agent_name: &str,
        memory: &Memory,
    ) -> Result<ConversationState> {
        let recent_messages = self
            .store
            .recent_memories(memory.room_id, self.settings.history_limit)
            .await?;

        let (knowledge, recollections) = if memory.is_agent_authored() {
            (Vec::new(), Vec::new())
        } else {
            let query = memory.content.text.as_str();
            let knowledge_hits = self
                .knowledge
                .search(query, self.settings.knowledge_limit)
                .await?;
            let recall_hits = self
                .recall
                .search(memory.room_id, query, self.settings.recall_limit)
                .await?;
            (
                select(
                    knowledge_hits,
                    self.settings.knowledge_threshold,
                    self.settings.knowledge_limit,
                    |fragment| fragment.text,
                ),
                select(
                    recall_hits,
                    self.settings.recall_threshold,
                    self.settings.recall_limit,
                    |turn| turn.content.text,
                ),
            )
        };

        tracing::debug!(
            room_id = %memory.room_id,
            history = recent_messages.len(),
            knowledge = knowledge.len(),
            recollections = recollections.len(),
            "composed conversation state"
        );

        Ok(ConversationState {
            agent_id: memory.agent_id,
            agent_name: agent_name.to_string(),
            room_id: memory.room_id,
            recent_messages,
            knowledge,
            recollections,
        })
    }

    /// Re-pull recent history after a reply was sent; the retrieved slices
    /// are kept as composed
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn refresh(&self, state: &mut ConversationState) -> Result<()> {
        state.recent_messages = self
            .store
            .recent_memories(state.room_id, self.settings.history_limit)
            .await?;
        Ok(())
    }
}

/// Keep ranked hits at or above the threshold, capped, mapped to their text
fn select<T>(
    hits: Vec<Scored<T>>,
    threshold: f32,
    limit: usize,
    text_of: impl Fn(T) -> String,
) -> Vec<String> {
    hits.into_iter()
        .filter(|hit| hit.score >= threshold)
        .take(limit)
        .map(|hit| text_of(hit.item))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::retrieval::KnowledgeFragment;
    use crate::store::UserAccount;

    struct FixedStore {
        history: Vec<Memory>,
    }

    #[async_trait]
    impl MemoryStore for FixedStore {
        async fn ensure_participant(
            &self,
            _account: &UserAccount,
            _room_id: Uuid,
            _channel_key: &str,
        ) -> Result<()> {
            Ok(())
        }

        async fn create_memory(&self, _memory: &Memory) -> Result<bool> {
            Ok(true)
        }

        async fn get_memory(&self, _id: Uuid) -> Result<Option<Memory>> {
            Ok(None)
        }

        async fn recent_memories(&self, _room_id: Uuid, limit: usize) -> Result<Vec<Memory>> {
            Ok(self.history.iter().take(limit).cloned().collect())
        }
    }

    struct FixedKnowledge {
        hits: Vec<(f32, &'static str)>,
    }

    #[async_trait]
    impl KnowledgeSource for FixedKnowledge {
        async fn search(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<Scored<KnowledgeFragment>>> {
            Ok(self
                .hits
                .iter()
                .map(|(score, text)| Scored {
                    item: KnowledgeFragment {
                        id: Uuid::new_v4(),
                        text: (*text).to_string(),
                        source: None,
                    },
                    score: *score,
                })
                .collect())
        }
    }

    struct FixedRecall {
        hits: Vec<(f32, &'static str)>,
    }

    #[async_trait]
    impl RecallSource for FixedRecall {
        async fn search(
            &self,
            _room_id: Uuid,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<Scored<Memory>>> {
            Ok(self
                .hits
                .iter()
                .map(|(score, text)| Scored {
                    item: Memory::ephemeral(Uuid::new_v4(), Uuid::new_v4(), (*text).to_string()),
                    score: *score,
                })
                .collect())
        }
    }

    fn composer(
        history: Vec<Memory>,
        knowledge: Vec<(f32, &'static str)>,
        recall: Vec<(f32, &'static str)>,
        settings: ComposerSettings,
    ) -> StateComposer {
        StateComposer::new(
            Arc::new(FixedStore { history }),
            Arc::new(FixedKnowledge { hits: knowledge }),
            Arc::new(FixedRecall { hits: recall }),
            settings,
        )
    }

    fn user_turn(agent_id: Uuid, room_id: Uuid, text: &str) -> Memory {
        let mut memory = Memory::ephemeral(agent_id, room_id, text.to_string());
        memory.user_id = Uuid::new_v4();
        memory
    }

    #[tokio::test]
    async fn test_thresholds_apply_independently() {
        let settings = ComposerSettings {
            knowledge_threshold: 0.3,
            recall_threshold: 0.6,
            ..ComposerSettings::default()
        };
        let composer = composer(
            Vec::new(),
            vec![(0.9, "kept-k"), (0.31, "kept-k2"), (0.29, "dropped-k")],
            vec![(0.61, "kept-r"), (0.59, "dropped-r")],
            settings,
        );

        let agent_id = Uuid::new_v4();
        let trigger = user_turn(agent_id, Uuid::new_v4(), "what is the coin about?");
        let state = composer.compose("orin", &trigger).await.unwrap();

        assert_eq!(state.knowledge, vec!["kept-k".to_string(), "kept-k2".to_string()]);
        assert_eq!(state.recollections, vec!["kept-r".to_string()]);
    }

    #[tokio::test]
    async fn test_caps_apply_after_threshold() {
        let settings = ComposerSettings {
            knowledge_limit: 2,
            knowledge_threshold: 0.0,
            ..ComposerSettings::default()
        };
        let composer = composer(
            Vec::new(),
            vec![(0.9, "a"), (0.8, "b"), (0.7, "c")],
            Vec::new(),
            settings,
        );

        let agent_id = Uuid::new_v4();
        let trigger = user_turn(agent_id, Uuid::new_v4(), "hello");
        let state = composer.compose("orin", &trigger).await.unwrap();
        assert_eq!(state.knowledge.len(), 2);
    }

    #[tokio::test]
    async fn test_agent_authored_trigger_skips_both_lookups() {
        let composer = composer(
            Vec::new(),
            vec![(0.9, "knowledge")],
            vec![(0.9, "recall")],
            ComposerSettings::default(),
        );

        let agent_id = Uuid::new_v4();
        let trigger = Memory::ephemeral(agent_id, Uuid::new_v4(), "my own words".to_string());
        let state = composer.compose("orin", &trigger).await.unwrap();
        assert!(state.knowledge.is_empty());
        assert!(state.recollections.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_replaces_history_and_keeps_slices() {
        let agent_id = Uuid::new_v4();
        let room_id = Uuid::new_v4();
        let composer = composer(
            vec![user_turn(agent_id, room_id, "newer history")],
            vec![(0.9, "kept")],
            Vec::new(),
            ComposerSettings::default(),
        );

        let trigger = user_turn(agent_id, room_id, "hello");
        let mut state = composer.compose("orin", &trigger).await.unwrap();
        state.recent_messages.clear();

        composer.refresh(&mut state).await.unwrap();
        assert_eq!(state.recent_messages.len(), 1);
        assert_eq!(state.knowledge, vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn test_history_respects_limit() {
        let agent_id = Uuid::new_v4();
        let room_id = Uuid::new_v4();
        let history: Vec<Memory> = (0..30)
            .map(|i| user_turn(agent_id, room_id, &format!("turn {i}")))
            .collect();
        let settings = ComposerSettings { history_limit: 5, ..ComposerSettings::default() };
        let composer = composer(history, Vec::new(), Vec::new(), settings);

        let trigger = user_turn(agent_id, room_id, "hello");
        let state = composer.compose("orin", &trigger).await.unwrap();
        assert_eq!(state.recent_messages.len(), 5);
    }
}

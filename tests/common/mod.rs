//! Shared test utilities

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use hearth_agent::db::{
    self, KnowledgeRepo, MemoryRepo, SqliteKnowledge, SqliteRecall, SqliteStore,
};
use hearth_agent::state::ConversationState;
use hearth_agent::{
    AgentProfile, AgentRuntime, AgentStatus, ChatChannel, ChatMessage, ComposerSettings,
    CreateMessage, Embedder, GeneratedContent, Identity, MemoryStore, PipelineSettings,
    ResponseGenerator, Result, StateComposer, Transport,
};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Mock transport that records sends and status updates
pub struct MockTransport {
    next_remote_id: AtomicI64,
    sent: Mutex<Vec<CreateMessage>>,
    statuses: Mutex<Vec<AgentStatus>>,
}

impl MockTransport {
    fn new() -> Self {
        Self {
            next_remote_id: AtomicI64::new(1000),
            sent: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
        }
    }

    /// Messages delivered through the transport, in send order
    pub async fn sent(&self) -> Vec<CreateMessage> {
        self.sent.lock().await.clone()
    }

    /// Status updates in emission order
    pub async fn statuses(&self) -> Vec<AgentStatus> {
        self.statuses.lock().await.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn send_message(&self, message: &CreateMessage) -> Result<ChatMessage> {
        let delivered = ChatMessage {
            id: self.next_remote_id.fetch_add(1, Ordering::SeqCst),
            client_uuid: message.client_uuid,
            channel: message.channel.clone(),
            sender: message.sender.clone(),
            text: message.text.clone(),
            open_graph_id: message.open_graph_id.clone(),
            balance: None,
            coin_address: None,
            created_at: Utc::now(),
        };
        self.sent.lock().await.push(message.clone());
        Ok(delivered)
    }

    async fn send_status(&self, _channel: &ChatChannel, status: AgentStatus) -> Result<()> {
        self.statuses.lock().await.push(status);
        Ok(())
    }
}

/// Generator that replays a scripted sequence of responses
pub struct StubGenerator {
    script: Mutex<VecDeque<GeneratedContent>>,
    fallback: GeneratedContent,
    calls: AtomicUsize,
}

impl StubGenerator {
    /// Produce `content` on every call
    #[must_use]
    pub fn of(content: GeneratedContent) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: content,
            calls: AtomicUsize::new(0),
        }
    }

    /// Produce each entry once, then fall back to empty content
    #[must_use]
    pub fn sequence(entries: Vec<GeneratedContent>) -> Self {
        Self {
            script: Mutex::new(entries.into()),
            fallback: GeneratedContent::default(),
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times the pipeline asked for a response
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResponseGenerator for StubGenerator {
    async fn generate(&self, _state: &ConversationState) -> Result<GeneratedContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().await.pop_front();
        Ok(scripted.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Embedder that maps every text to the same unit vector
pub struct StaticEmbedder;

#[async_trait]
impl Embedder for StaticEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0, 0.0])
    }
}

/// A fully wired runtime over an in-memory database and mock transport
pub struct TestAgent {
    pub runtime: AgentRuntime,
    pub transport: Arc<MockTransport>,
    pub generator: Arc<StubGenerator>,
    pub store: Arc<SqliteStore>,
    pub profile: AgentProfile,
}

/// Wire a runtime around scripted generation with default settings
#[must_use]
pub fn build_agent(generator: StubGenerator) -> TestAgent {
    build_agent_with(generator, PipelineSettings::default())
}

/// Wire a runtime around scripted generation and explicit settings
#[must_use]
pub fn build_agent_with(generator: StubGenerator, settings: PipelineSettings) -> TestAgent {
    let pool = db::init_memory().expect("failed to init test db");
    let transport = Arc::new(MockTransport::new());
    let generator = Arc::new(generator);
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let embedder: Arc<dyn Embedder> = Arc::new(StaticEmbedder);

    let composer = StateComposer::new(
        Arc::clone(&store) as Arc<dyn MemoryStore>,
        Arc::new(SqliteKnowledge::new(
            KnowledgeRepo::new(pool.clone()),
            Arc::clone(&embedder),
        )),
        Arc::new(SqliteRecall::new(MemoryRepo::new(pool), Arc::clone(&embedder))),
        ComposerSettings::default(),
    );

    let profile = AgentProfile::new(agent_identity(), "Hearth");
    let runtime = AgentRuntime::new(
        profile.clone(),
        composer,
        Arc::clone(&generator) as Arc<dyn ResponseGenerator>,
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::clone(&store) as Arc<dyn MemoryStore>,
        settings,
    );

    TestAgent {
        runtime,
        transport,
        generator,
        store,
        profile,
    }
}

/// The identity the test agent runs under
#[must_use]
pub fn agent_identity() -> Identity {
    Identity::parse("agent-hearth").expect("valid agent identity")
}

/// A wallet address built from one repeated hex digit
#[must_use]
pub fn wallet(digit: char) -> Identity {
    Identity::parse(&format!("0x{}", digit.to_string().repeat(40))).expect("valid address")
}

/// A direct channel between the given user and the test agent
#[must_use]
pub fn dm_with(user: &Identity) -> ChatChannel {
    ChatChannel::dm(user.clone(), agent_identity())
}

/// A one-message event payload in the platform wire shape
#[must_use]
pub fn event_payload(
    channel: &ChatChannel,
    remote_id: i64,
    sender: &Identity,
    text: &str,
) -> serde_json::Value {
    serde_json::json!([{
        "message": {
            "id": remote_id,
            "clientUuid": Uuid::new_v4(),
            "channel": channel.to_string(),
            "sender": sender.as_str(),
            "text": text,
            "createdAt": Utc::now().to_rfc3339(),
        }
    }])
}

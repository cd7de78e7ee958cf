//! Hearth - conversational agent runtime for token-community chat
//!
//! This library implements the message pipeline for an autonomous chat
//! agent:
//! - Channel and identity codecs with deterministic storage keys
//! - A hook registry with veto gates around generation and actions
//! - Conversation state composed from history, knowledge, and recall
//! - An ingestion state machine from raw payload to persisted reply
//! - A bounded continuation loop for agent-initiated follow-up turns
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Chat platform                      │
//! │   event feed  │  send API  │  status side-channel   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Hearth runtime                      │
//! │  Dispatcher │ Pipeline │ Hooks │ Actions │ Composer │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │          SQLite store  │  LLM adapters              │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod channel;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod evaluators;
pub mod generation;
pub mod hooks;
pub mod identity;
pub mod llm;
pub mod memory;
pub mod message;
pub mod pipeline;
pub mod retrieval;
pub mod runtime;
pub mod security;
pub mod state;
pub mod store;
pub mod transport;

pub use actions::{
    ActionHandler, ActionKind, ActionRegistry, Continuation, ContinuationSink, ContinueAction,
    IgnoreAction, RegisteredAction,
};
pub use channel::ChatChannel;
pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use evaluators::Evaluator;
pub use generation::{GeneratedContent, ResponseGenerator};
pub use hooks::{Hook, HookContext, HookId, HookPoint, HookRegistry};
pub use identity::Identity;
pub use memory::Memory;
pub use message::{ChatMessage, CreateMessage};
pub use pipeline::{DropReason, PipelineOutcome};
pub use retrieval::{Embedder, KnowledgeSource, RecallSource};
pub use runtime::{AgentProfile, AgentRuntime, PipelineSettings};
pub use security::{AdminCommand, AdminEnvelope, AdminGuard};
pub use state::{ComposerSettings, ConversationState, StateComposer};
pub use store::{MemoryStore, UserAccount};
pub use transport::{AgentStatus, Transport};

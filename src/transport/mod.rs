//! Outbound transport seam
//!
//! The pipeline talks to the chat platform through this trait: sending turns
//! and flipping the per-channel presence indicator. Inbound delivery is the
//! dispatcher's side; see `crate::dispatch`.

mod api;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use api::{ApiTransport, InboundEvent};

use crate::channel::ChatChannel;
use crate::message::{ChatMessage, CreateMessage};
use crate::Result;

/// Presence indicator shown next to the agent in a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Nothing in flight
    Idle,
    /// A message is being processed
    Thinking,
    /// A reply is being written
    Typing,
}

impl AgentStatus {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Thinking => "thinking",
            Self::Typing => "typing",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound path to the chat platform
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Send a turn; the platform answers with the stored message, remote id
    /// assigned
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects or fails the send.
    async fn send_message(&self, message: &CreateMessage) -> Result<ChatMessage>;

    /// Flip the presence indicator on a channel
    ///
    /// Callers treat failures as best-effort; implementations still surface
    /// them so callers can log.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects or fails the update.
    async fn send_status(&self, channel: &ChatChannel, status: AgentStatus) -> Result<()>;
}

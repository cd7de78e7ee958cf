//! Durable conversation turns and their deterministic storage keys
//!
//! Every storage key is a UUIDv5 of a canonical string under one fixed
//! namespace: room ids hash the channel key, account ids hash the identity
//! key, and turn ids hash `{channel key}:{remote message id}`. Key derivation
//! being a pure function is what makes inbound persistence idempotent:
//! redelivery of the same remote message maps to the same row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actions::ActionKind;
use crate::channel::ChatChannel;
use crate::identity::Identity;
use crate::message::ChatMessage;

/// Namespace for all derived keys. Changing it would re-key every stored
/// conversation, so it is fixed for the lifetime of the schema.
pub const KEY_NAMESPACE: Uuid = Uuid::from_u128(0x1d83_c1f0_9e4a_4b8e_a1c3_7f25_60d1_4b2c);

/// Source tag recorded on every turn that flows through this runtime
pub const MESSAGE_SOURCE: &str = "tokenchat";

/// Storage key of the room behind a channel
#[must_use]
pub fn room_id(channel: &ChatChannel) -> Uuid {
    Uuid::new_v5(&KEY_NAMESPACE, channel.to_string().as_bytes())
}

/// Storage key of the account behind an identity
#[must_use]
pub fn account_id(identity: &Identity) -> Uuid {
    Uuid::new_v5(&KEY_NAMESPACE, identity.as_str().as_bytes())
}

/// Storage key of the turn carrying a transport-assigned message id
#[must_use]
pub fn turn_id(channel: &ChatChannel, remote_id: i64) -> Uuid {
    Uuid::new_v5(&KEY_NAMESPACE, format!("{channel}:{remote_id}").as_bytes())
}

/// Body of a conversational turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryContent {
    /// Message text
    pub text: String,
    /// Provenance tag (always [`MESSAGE_SOURCE`] for platform traffic)
    pub source: String,
    /// Turn this one replies to; corrections are new turns pointing back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<Uuid>,
    /// Follow-up action the turn requested, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionKind>,
    /// Transport-assigned message id, absent for unsent turns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<i64>,
}

/// A persisted, immutable record of one conversational turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Deterministic turn key (or a random continuation key for unsent turns)
    pub id: Uuid,
    /// Account key of the agent that owns this history
    pub agent_id: Uuid,
    /// Account key of the turn's author
    pub user_id: Uuid,
    /// Room key of the channel the turn belongs to
    pub room_id: Uuid,
    /// Turn body
    pub content: MemoryContent,
    /// When the turn was created
    pub created_at: DateTime<Utc>,
    /// Whether the write is deduplicated on id
    pub unique: bool,
}

impl Memory {
    /// Build the turn record for a message assigned an id by the transport,
    /// inbound or outbound alike
    #[must_use]
    pub fn from_remote(agent_id: Uuid, message: &ChatMessage) -> Self {
        Self {
            id: turn_id(&message.channel, message.id),
            agent_id,
            user_id: account_id(&message.sender),
            room_id: room_id(&message.channel),
            content: MemoryContent {
                text: message.text.clone(),
                source: MESSAGE_SOURCE.to_string(),
                in_reply_to: None,
                action: None,
                remote_id: Some(message.id),
            },
            created_at: message.created_at,
            unique: true,
        }
    }

    /// Build an agent-authored turn that was never sent (suppressed initial
    /// reply); keyed by a fresh continuation key and never persisted
    #[must_use]
    pub fn ephemeral(agent_id: Uuid, room_id: Uuid, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            user_id: agent_id,
            room_id,
            content: MemoryContent {
                text,
                source: MESSAGE_SOURCE.to_string(),
                in_reply_to: None,
                action: None,
                remote_id: None,
            },
            created_at: Utc::now(),
            unique: false,
        }
    }

    /// Link this turn to the one it replies to
    #[must_use]
    pub fn with_in_reply_to(mut self, id: Uuid) -> Self {
        self.content.in_reply_to = Some(id);
        self
    }

    /// Record the follow-up action this turn requested
    #[must_use]
    pub fn with_action(mut self, action: ActionKind) -> Self {
        self.content.action = Some(action);
        self
    }

    /// Whether the turn was authored by the agent itself
    #[must_use]
    pub fn is_agent_authored(&self) -> bool {
        self.user_id == self.agent_id
    }
}

//! Hook points and their per-point context payloads
//!
//! Each lifecycle point gets its own tagged context variant, so a handler
//! can pattern-match the payload it cares about without runtime casts.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::channel::ChatChannel;
use crate::generation::GeneratedContent;
use crate::identity::Identity;
use crate::memory::Memory;
use crate::state::ConversationState;

/// Lifecycle points where registered hooks may veto continuation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Inbound message accepted, nothing persisted yet
    MessageReceived,
    /// State composed, generation not yet invoked
    BeforeGeneration,
    /// Generated content available, nothing sent yet
    AfterGeneration,
    /// A continuation turn is about to be sent
    BeforeAction,
    /// A continuation turn has been sent and persisted
    AfterAction,
}

impl HookPoint {
    /// Stable name, used in logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MessageReceived => "message-received",
            Self::BeforeGeneration => "before-generation",
            Self::AfterGeneration => "after-generation",
            Self::BeforeAction => "before-action",
            Self::AfterAction => "after-action",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-persistence view of an inbound message
#[derive(Debug, Clone)]
pub struct MessageReceivedContext {
    /// Channel the message arrived on
    pub channel: ChatChannel,
    /// Author identity
    pub sender: Identity,
    /// Message text
    pub text: String,
    /// Server-side creation time
    pub created_at: DateTime<Utc>,
}

/// Context for the gate points (`before-generation`, `before-action`)
#[derive(Debug, Clone)]
pub struct GateContext {
    /// The inbound turn driving this pipeline run
    pub memory: Memory,
    /// Agent turns produced so far in this run
    pub responses: Vec<Memory>,
    /// Composed conversation state; mutations are visible to later handlers
    /// in the same dispatch and to the rest of the pipeline run
    pub state: ConversationState,
}

/// Context for the review points (`after-generation`, `after-action`),
/// carrying the content under review
#[derive(Debug, Clone)]
pub struct ReviewContext {
    /// The inbound turn driving this pipeline run
    pub memory: Memory,
    /// Agent turns produced so far in this run
    pub responses: Vec<Memory>,
    /// Composed conversation state
    pub state: ConversationState,
    /// The content that was generated or just sent
    pub content: GeneratedContent,
}

/// Tagged per-point hook context, passed by `&mut` through one dispatch
#[derive(Debug, Clone)]
pub enum HookContext {
    /// Payload for [`HookPoint::MessageReceived`]
    MessageReceived(MessageReceivedContext),
    /// Payload for [`HookPoint::BeforeGeneration`]
    BeforeGeneration(GateContext),
    /// Payload for [`HookPoint::AfterGeneration`]
    AfterGeneration(ReviewContext),
    /// Payload for [`HookPoint::BeforeAction`]
    BeforeAction(GateContext),
    /// Payload for [`HookPoint::AfterAction`]
    AfterAction(ReviewContext),
}

impl HookContext {
    /// The point this context belongs to
    #[must_use]
    pub const fn point(&self) -> HookPoint {
        match self {
            Self::MessageReceived(_) => HookPoint::MessageReceived,
            Self::BeforeGeneration(_) => HookPoint::BeforeGeneration,
            Self::AfterGeneration(_) => HookPoint::AfterGeneration,
            Self::BeforeAction(_) => HookPoint::BeforeAction,
            Self::AfterAction(_) => HookPoint::AfterAction,
        }
    }

    /// Conversation state, absent at `message-received`
    #[must_use]
    pub const fn state(&self) -> Option<&ConversationState> {
        match self {
            Self::MessageReceived(_) => None,
            Self::BeforeGeneration(gate) | Self::BeforeAction(gate) => Some(&gate.state),
            Self::AfterGeneration(review) | Self::AfterAction(review) => Some(&review.state),
        }
    }

    /// Mutable conversation state, absent at `message-received`
    pub const fn state_mut(&mut self) -> Option<&mut ConversationState> {
        match self {
            Self::MessageReceived(_) => None,
            Self::BeforeGeneration(gate) | Self::BeforeAction(gate) => Some(&mut gate.state),
            Self::AfterGeneration(review) | Self::AfterAction(review) => Some(&mut review.state),
        }
    }

    /// Content under review, present only at the review points
    #[must_use]
    pub const fn content(&self) -> Option<&GeneratedContent> {
        match self {
            Self::AfterGeneration(review) | Self::AfterAction(review) => Some(&review.content),
            _ => None,
        }
    }

    /// Reclaim the state after a dispatch; `None` at `message-received`
    #[must_use]
    pub fn into_state(self) -> Option<ConversationState> {
        match self {
            Self::MessageReceived(_) => None,
            Self::BeforeGeneration(gate) | Self::BeforeAction(gate) => Some(gate.state),
            Self::AfterGeneration(review) | Self::AfterAction(review) => Some(review.state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_state() -> ConversationState {
        ConversationState::empty(Uuid::new_v4(), "orin".to_string(), Uuid::new_v4())
    }

    fn sample_memory() -> Memory {
        Memory::ephemeral(Uuid::new_v4(), Uuid::new_v4(), "hi".to_string())
    }

    #[test]
    fn test_point_matches_variant() {
        let gate = HookContext::BeforeGeneration(GateContext {
            memory: sample_memory(),
            responses: Vec::new(),
            state: sample_state(),
        });
        assert_eq!(gate.point(), HookPoint::BeforeGeneration);
        assert!(gate.state().is_some());
        assert!(gate.content().is_none());
    }

    #[test]
    fn test_review_carries_content() {
        let review = HookContext::AfterGeneration(ReviewContext {
            memory: sample_memory(),
            responses: Vec::new(),
            state: sample_state(),
            content: GeneratedContent::text("hello"),
        });
        assert_eq!(review.content().map(|c| c.text.as_str()), Some("hello"));
        assert!(review.into_state().is_some());
    }

    #[test]
    fn test_message_received_has_no_state() {
        let ctx = HookContext::MessageReceived(MessageReceivedContext {
            channel: ChatChannel::dm(
                Identity::parse(&format!("0x{}", "a".repeat(40))).unwrap(),
                Identity::parse(&format!("0x{}", "b".repeat(40))).unwrap(),
            ),
            sender: Identity::parse(&format!("0x{}", "a".repeat(40))).unwrap(),
            text: "hi".to_string(),
            created_at: Utc::now(),
        });
        assert_eq!(ctx.point(), HookPoint::MessageReceived);
        assert!(ctx.state().is_none());
        assert!(ctx.into_state().is_none());
    }

    #[test]
    fn test_point_names() {
        assert_eq!(HookPoint::BeforeAction.to_string(), "before-action");
        assert_eq!(HookPoint::MessageReceived.as_str(), "message-received");
    }
}

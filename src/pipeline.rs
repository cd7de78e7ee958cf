//! Message ingestion pipeline
//!
//! Drives one inbound transport event from receipt to response: validate,
//! persist, compose state, gate, generate, gate again, reply, then hand off
//! to the requested action. Gates are hook dispatches; the first `false`
//! ends the run with an idle status and no further side effects. Handler
//! and collaborator errors abort the run and leave the channel status at
//! its last-emitted value.

use crate::actions::{ActionKind, ContinuationSink};
use crate::channel::ChatChannel;
use crate::evaluators::run_all;
use crate::hooks::{GateContext, HookContext, HookPoint, MessageReceivedContext, ReviewContext};
use crate::memory::Memory;
use crate::message::{ChatMessage, CreateMessage, HydratedMessage};
use crate::runtime::AgentRuntime;
use crate::state::ConversationState;
use crate::store::UserAccount;
use crate::transport::AgentStatus;
use crate::{Error, Result};

/// Why an event never entered the pipeline proper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No messages in the event, or an empty message text
    EmptyPayload,
    /// The sender is the agent itself
    SelfAuthored,
    /// The message belongs to a different channel than it arrived on
    ForeignChannel,
    /// The agent is not a party to the message's channel
    NotParticipant,
    /// The payload did not parse
    Malformed,
}

/// How one pipeline run ended
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Rejected during validation; nothing persisted, no status emitted
    Dropped(DropReason),
    /// A hook vetoed at this point
    Suppressed(HookPoint),
    /// Generation produced no text; nothing sent or stored for the reply
    NoReply,
    /// The run completed
    Replied {
        /// Whether the initial reply actually went out (false when the
        /// action suppressed it)
        reply_sent: bool,
        /// Continuation turns the action emitted
        continuations: usize,
    },
}

impl AgentRuntime {
    /// Process one inbound transport event for a channel
    ///
    /// Events carry an array of hydrated messages; only the first is
    /// processed.
    ///
    /// # Errors
    ///
    /// Returns an error when generation, persistence, sending, or a hook
    /// handler fails. Validation rejects are outcomes, not errors.
    #[allow(clippy::too_many_lines)]
    pub async fn process_event(
        &self,
        channel: &ChatChannel,
        payload: serde_json::Value,
    ) -> Result<PipelineOutcome> {
        let Some(hydrated) = parse_event(channel, payload) else {
            return Ok(PipelineOutcome::Dropped(DropReason::Malformed));
        };
        let Some(message) = first_message(channel, hydrated) else {
            tracing::debug!(channel = %channel, "event carries no messages, dropping");
            return Ok(PipelineOutcome::Dropped(DropReason::EmptyPayload));
        };
        if message.text.trim().is_empty() {
            tracing::debug!(channel = %channel, "empty message text, dropping");
            return Ok(PipelineOutcome::Dropped(DropReason::EmptyPayload));
        }
        if message.channel != *channel {
            tracing::warn!(
                channel = %channel,
                message_channel = %message.channel,
                "message for a different channel, dropping"
            );
            return Ok(PipelineOutcome::Dropped(DropReason::ForeignChannel));
        }
        if message.sender == self.profile.identity {
            tracing::debug!(channel = %channel, "own message echoed back, dropping");
            return Ok(PipelineOutcome::Dropped(DropReason::SelfAuthored));
        }
        if !message.channel.involves(&self.profile.identity) {
            tracing::warn!(channel = %channel, "agent is not a party to this channel, dropping");
            return Ok(PipelineOutcome::Dropped(DropReason::NotParticipant));
        }

        self.set_status(channel, AgentStatus::Thinking).await;

        let inbound = Memory::from_remote(self.profile.id, &message);
        let mut persisted = false;
        if self.settings.persist_before_gate {
            self.persist_inbound(channel, &message, &inbound).await?;
            persisted = true;
        }

        let mut ctx = HookContext::MessageReceived(MessageReceivedContext {
            channel: channel.clone(),
            sender: message.sender.clone(),
            text: message.text.clone(),
            created_at: message.created_at,
        });
        if !self.hooks.dispatch(&mut ctx).await? {
            self.set_status(channel, AgentStatus::Idle).await;
            return Ok(PipelineOutcome::Suppressed(HookPoint::MessageReceived));
        }

        if !persisted {
            self.persist_inbound(channel, &message, &inbound).await?;
        }

        let mut state = self.composer.compose(&self.profile.name, &inbound).await?;
        run_all(&self.evaluators, &inbound, &state).await;

        let mut ctx = HookContext::BeforeGeneration(GateContext {
            memory: inbound.clone(),
            responses: Vec::new(),
            state,
        });
        let allowed = self.hooks.dispatch(&mut ctx).await?;
        state = reclaim_state(ctx)?;
        if !allowed {
            self.set_status(channel, AgentStatus::Idle).await;
            return Ok(PipelineOutcome::Suppressed(HookPoint::BeforeGeneration));
        }

        self.set_status(channel, AgentStatus::Typing).await;
        let content = self.generator.generate(&state).await?;

        let mut ctx = HookContext::AfterGeneration(ReviewContext {
            memory: inbound.clone(),
            responses: Vec::new(),
            state,
            content: content.clone(),
        });
        let allowed = self.hooks.dispatch(&mut ctx).await?;
        state = reclaim_state(ctx)?;
        if !allowed {
            self.set_status(channel, AgentStatus::Idle).await;
            return Ok(PipelineOutcome::Suppressed(HookPoint::AfterGeneration));
        }

        if content.text.trim().is_empty() {
            tracing::debug!(channel = %channel, "generation produced no text");
            self.set_status(channel, AgentStatus::Idle).await;
            return Ok(PipelineOutcome::NoReply);
        }

        let action = content.action.as_deref().and_then(|name| {
            let registered = self.actions.resolve(name);
            if registered.is_none() {
                tracing::warn!(action = name, "requested action is not available");
            }
            registered
        });
        let action_kind = content.action.as_deref().and_then(|name| name.parse().ok());
        let suppress = action.is_some_and(|a| a.suppress_initial_reply);

        let mut responses = Vec::new();
        let reply_sent = if suppress {
            let mut reply =
                Memory::ephemeral(self.profile.id, inbound.room_id, content.text.clone())
                    .with_in_reply_to(inbound.id);
            if let Some(kind) = action_kind {
                reply = reply.with_action(kind);
            }
            run_all(&self.evaluators, &reply, &state).await;
            responses.push(reply);
            false
        } else {
            let outbound = CreateMessage::new(
                channel.clone(),
                self.profile.identity.clone(),
                content.text.clone(),
            );
            let delivered = self.transport.send_message(&outbound).await?;
            let mut reply =
                Memory::from_remote(self.profile.id, &delivered).with_in_reply_to(inbound.id);
            if let Some(kind) = action_kind {
                reply = reply.with_action(kind);
            }
            if let Err(error) = self.store.create_memory(&reply).await {
                tracing::error!(
                    turn_id = %reply.id,
                    error = %error,
                    "reply was sent but could not be recorded"
                );
                return Err(error);
            }
            run_all(&self.evaluators, &reply, &state).await;
            self.composer.refresh(&mut state).await?;
            tracing::info!(channel = %channel, remote_id = delivered.id, "reply sent");
            responses.push(reply);
            true
        };

        let Some(action) = action else {
            self.set_status(channel, AgentStatus::Idle).await;
            return Ok(PipelineOutcome::Replied { reply_sent, continuations: 0 });
        };

        if action.kind != ActionKind::Continue {
            self.set_status(channel, AgentStatus::Thinking).await;
        }

        let mut sink = ContinuationSink::new(
            &self.hooks,
            self.transport.as_ref(),
            self.store.as_ref(),
            &self.evaluators,
            channel,
            &self.profile.identity,
            &inbound,
            state,
            responses,
            self.settings.max_continuations,
        );
        let options = content.options();
        action.handler.execute(&options, &mut sink).await?;
        let (_state, _responses, continuations) = sink.finish();

        self.set_status(channel, AgentStatus::Idle).await;
        Ok(PipelineOutcome::Replied { reply_sent, continuations })
    }

    /// Idempotently record the accounts, room, membership, and inbound turn
    async fn persist_inbound(
        &self,
        channel: &ChatChannel,
        message: &ChatMessage,
        inbound: &Memory,
    ) -> Result<()> {
        let key = channel.to_string();
        let user = UserAccount::for_identity(message.sender.clone());
        let agent = UserAccount::for_identity(self.profile.identity.clone());
        self.store.ensure_participant(&user, inbound.room_id, &key).await?;
        self.store.ensure_participant(&agent, inbound.room_id, &key).await?;

        if !self.store.create_memory(inbound).await? {
            tracing::info!(turn_id = %inbound.id, "turn already stored, continuing");
        }
        Ok(())
    }

    /// Status updates are best-effort; a refused update never stops the run
    pub(crate) async fn set_status(&self, channel: &ChatChannel, status: AgentStatus) {
        if let Err(error) = self.transport.send_status(channel, status).await {
            tracing::warn!(
                channel = %channel,
                status = %status,
                error = %error,
                "status update failed"
            );
        }
    }
}

/// Parse the raw event payload; events carry an array of hydrated messages
fn parse_event(channel: &ChatChannel, payload: serde_json::Value) -> Option<Vec<HydratedMessage>> {
    match serde_json::from_value(payload) {
        Ok(hydrated) => Some(hydrated),
        Err(error) => {
            tracing::warn!(channel = %channel, error = %error, "malformed event payload");
            None
        }
    }
}

/// Take the first message out of the event, if it carries any
fn first_message(channel: &ChatChannel, hydrated: Vec<HydratedMessage>) -> Option<ChatMessage> {
    if hydrated.len() > 1 {
        tracing::debug!(
            channel = %channel,
            count = hydrated.len(),
            "event carries multiple messages, processing the first"
        );
    }
    hydrated.into_iter().next().map(|h| h.message)
}

/// Take the state back out of a dispatched context
fn reclaim_state(ctx: HookContext) -> Result<ConversationState> {
    ctx.into_state()
        .ok_or_else(|| Error::Hook("context variant replaced during dispatch".to_string()))
}

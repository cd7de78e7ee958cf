//! Follow-up actions
//!
//! Generated content may name one action; its handler runs after the reply
//! step and emits further turns through a [`ContinuationSink`]. Action kinds
//! are a closed set, and handlers are bound to a kind at registration time,
//! so an unrecognized name can only mean "no action".

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channel::ChatChannel;
use crate::evaluators::{run_all, Evaluator};
use crate::generation::{GeneratedContent, ResponseGenerator};
use crate::hooks::{GateContext, HookContext, HookRegistry, ReviewContext};
use crate::identity::Identity;
use crate::memory::Memory;
use crate::message::CreateMessage;
use crate::state::ConversationState;
use crate::store::MemoryStore;
use crate::transport::Transport;
use crate::{Error, Result};

/// The closed set of follow-up behaviors generated content may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// Keep talking: produce one more turn in the same voice
    Continue,
    /// Say nothing at all for this message
    Ignore,
    /// Launch a token for the room
    CreateCoin,
    /// Send tokens to a participant
    Tip,
}

impl ActionKind {
    /// Wire name, as generated content spells it
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "CONTINUE",
            Self::Ignore => "IGNORE",
            Self::CreateCoin => "CREATE_COIN",
            Self::Tip => "TIP",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CONTINUE" => Ok(Self::Continue),
            "IGNORE" => Ok(Self::Ignore),
            "CREATE_COIN" => Ok(Self::CreateCoin),
            "TIP" => Ok(Self::Tip),
            other => Err(Error::Action(format!("unknown action kind: {other}"))),
        }
    }
}

/// Outcome of one [`ContinuationSink::send`] call
#[derive(Debug, Clone, PartialEq)]
pub enum Continuation {
    /// The turn went out and was persisted
    Sent(Memory),
    /// A gate vetoed this or an earlier turn; nothing was sent
    Halted,
}

/// Handler for one action kind
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run the action, emitting zero or more turns through the sink
    ///
    /// `options` carries any extra fields the generated content supplied
    /// beyond `text` and `action`.
    ///
    /// # Errors
    ///
    /// Errors abort the pipeline run for this message.
    async fn execute(
        &self,
        options: &serde_json::Value,
        sink: &mut ContinuationSink<'_>,
    ) -> Result<()>;
}

/// An action kind bound to its handler
#[derive(Clone)]
pub struct RegisteredAction {
    /// Which kind this handler serves
    pub kind: ActionKind,
    /// Skip sending the initial reply; evaluators still see it
    pub suppress_initial_reply: bool,
    /// The behavior itself
    pub handler: Arc<dyn ActionHandler>,
}

impl RegisteredAction {
    /// Bind a handler to a kind
    pub fn new(
        kind: ActionKind,
        suppress_initial_reply: bool,
        handler: Arc<dyn ActionHandler>,
    ) -> Self {
        Self { kind, suppress_initial_reply, handler }
    }
}

impl fmt::Debug for RegisteredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredAction")
            .field("kind", &self.kind)
            .field("suppress_initial_reply", &self.suppress_initial_reply)
            .finish_non_exhaustive()
    }
}

/// Registration map from kind to handler, one handler per kind
#[derive(Debug, Default)]
pub struct ActionRegistry {
    actions: HashMap<ActionKind, RegisteredAction>,
}

impl ActionRegistry {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action
    ///
    /// # Errors
    ///
    /// Returns an error if the kind already has a handler.
    pub fn register(&mut self, action: RegisteredAction) -> Result<()> {
        let kind = action.kind;
        if self.actions.contains_key(&kind) {
            return Err(Error::Action(format!("action already registered: {kind}")));
        }
        self.actions.insert(kind, action);
        Ok(())
    }

    /// Look up a registered action by kind
    #[must_use]
    pub fn get(&self, kind: ActionKind) -> Option<&RegisteredAction> {
        self.actions.get(&kind)
    }

    /// Resolve a wire name to its registered action, if both the name and
    /// the registration exist
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&RegisteredAction> {
        name.parse::<ActionKind>().ok().and_then(|kind| self.get(kind))
    }

    /// Number of registered actions
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether no actions are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// The send callback handed to an action handler
///
/// Each `send` is one continuation turn: gated by the before-action hook,
/// sent over the transport, persisted with `in_reply_to` pointing at the
/// triggering turn, observed by evaluators, then reviewed by the after-action
/// hook. Once any gate trips, the sink is fused and later sends are no-ops.
/// The number of turns per handler invocation is capped; exceeding the cap
/// is a fatal action error.
pub struct ContinuationSink<'a> {
    hooks: &'a HookRegistry,
    transport: &'a dyn Transport,
    store: &'a dyn MemoryStore,
    evaluators: &'a [Arc<dyn Evaluator>],
    channel: &'a ChatChannel,
    sender: &'a Identity,
    trigger: &'a Memory,
    state: ConversationState,
    responses: Vec<Memory>,
    cap: usize,
    sent: usize,
    halted: bool,
}

impl<'a> ContinuationSink<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        hooks: &'a HookRegistry,
        transport: &'a dyn Transport,
        store: &'a dyn MemoryStore,
        evaluators: &'a [Arc<dyn Evaluator>],
        channel: &'a ChatChannel,
        sender: &'a Identity,
        trigger: &'a Memory,
        state: ConversationState,
        responses: Vec<Memory>,
        cap: usize,
    ) -> Self {
        Self {
            hooks,
            transport,
            store,
            evaluators,
            channel,
            sender,
            trigger,
            state,
            responses,
            cap,
            sent: 0,
            halted: false,
        }
    }

    /// The conversation state as of the latest turn
    #[must_use]
    pub const fn state(&self) -> &ConversationState {
        &self.state
    }

    /// The inbound turn that triggered this action
    #[must_use]
    pub const fn trigger(&self) -> &Memory {
        self.trigger
    }

    /// Agent turns produced so far in this pipeline run
    #[must_use]
    pub fn responses(&self) -> &[Memory] {
        &self.responses
    }

    /// Continuation turns sent through this sink
    #[must_use]
    pub const fn sent(&self) -> usize {
        self.sent
    }

    /// Whether a gate has fused the sink
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Emit one continuation turn
    ///
    /// # Errors
    ///
    /// Returns an error if the cap is exceeded, a hook handler fails, or the
    /// send or persistence step fails. A send that fails after the transport
    /// accepted it leaves a turn on the channel with no stored record; that
    /// gap is logged by the caller, not repaired here.
    pub async fn send(&mut self, content: GeneratedContent) -> Result<Continuation> {
        if self.halted {
            return Ok(Continuation::Halted);
        }
        if self.sent >= self.cap {
            return Err(Error::Action(format!(
                "action exceeded continuation cap of {}",
                self.cap
            )));
        }

        let mut ctx = HookContext::BeforeAction(GateContext {
            memory: self.trigger.clone(),
            responses: self.responses.clone(),
            state: self.state.clone(),
        });
        let allowed = self.hooks.dispatch(&mut ctx).await?;
        self.reclaim(ctx);
        if !allowed {
            self.halted = true;
            return Ok(Continuation::Halted);
        }

        let outbound = CreateMessage::new(
            self.channel.clone(),
            self.sender.clone(),
            content.text.clone(),
        );
        let delivered = self.transport.send_message(&outbound).await?;

        let mut memory =
            Memory::from_remote(self.trigger.agent_id, &delivered).with_in_reply_to(self.trigger.id);
        if let Some(kind) = content.action.as_deref().and_then(|name| name.parse().ok()) {
            memory = memory.with_action(kind);
        }
        self.store.create_memory(&memory).await?;
        run_all(self.evaluators, &memory, &self.state).await;

        self.sent += 1;
        self.responses.push(memory.clone());

        let mut ctx = HookContext::AfterAction(ReviewContext {
            memory: self.trigger.clone(),
            responses: self.responses.clone(),
            state: self.state.clone(),
            content,
        });
        let reviewed = self.hooks.dispatch(&mut ctx).await?;
        self.reclaim(ctx);
        if reviewed {
            tracing::info!(
                channel = %self.channel,
                remote_id = delivered.id,
                turn = self.sent,
                "continuation sent"
            );
        } else {
            self.halted = true;
        }

        Ok(Continuation::Sent(memory))
    }

    /// Hand the working copies back to the pipeline
    pub(crate) fn finish(self) -> (ConversationState, Vec<Memory>, usize) {
        (self.state, self.responses, self.sent)
    }

    /// Carry hook mutations of the state forward
    fn reclaim(&mut self, ctx: HookContext) {
        if let Some(state) = ctx.into_state() {
            self.state = state;
        }
    }
}

impl fmt::Debug for ContinuationSink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationSink")
            .field("channel", &self.channel)
            .field("cap", &self.cap)
            .field("sent", &self.sent)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

/// Respond with silence; the initial reply is suppressed outright
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreAction;

#[async_trait]
impl ActionHandler for IgnoreAction {
    async fn execute(
        &self,
        _options: &serde_json::Value,
        _sink: &mut ContinuationSink<'_>,
    ) -> Result<()> {
        Ok(())
    }
}

impl IgnoreAction {
    /// Registration entry for the ignore behavior
    #[must_use]
    pub fn registered() -> RegisteredAction {
        RegisteredAction::new(ActionKind::Ignore, true, Arc::new(Self))
    }
}

/// Produce one more turn in the same voice, without waiting for the user
pub struct ContinueAction {
    generator: Arc<dyn ResponseGenerator>,
}

impl ContinueAction {
    /// Registration entry for the continue behavior
    #[must_use]
    pub fn registered(generator: Arc<dyn ResponseGenerator>) -> RegisteredAction {
        RegisteredAction::new(ActionKind::Continue, false, Arc::new(Self { generator }))
    }
}

#[async_trait]
impl ActionHandler for ContinueAction {
    async fn execute(
        &self,
        _options: &serde_json::Value,
        sink: &mut ContinuationSink<'_>,
    ) -> Result<()> {
        let content = self.generator.generate(sink.state()).await?;
        if content.text.trim().is_empty() {
            tracing::debug!("continuation produced no text, stopping");
            return Ok(());
        }
        sink.send(content).await?;
        Ok(())
    }
}

impl fmt::Debug for ContinueAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinueAction").finish_non_exhaustive()
    }
}

//! Agent runtime assembly
//!
//! Owns the hook registry, action table, evaluators, and collaborator seams
//! for one agent. Everything is instance state; two runtimes in one process
//! do not share anything.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::actions::{ActionRegistry, RegisteredAction};
use crate::evaluators::Evaluator;
use crate::generation::ResponseGenerator;
use crate::hooks::HookRegistry;
use crate::identity::Identity;
use crate::memory;
use crate::security::{AdminCommand, AdminEnvelope, AdminGuard};
use crate::state::StateComposer;
use crate::store::MemoryStore;
use crate::transport::Transport;
use crate::{Error, Result};

/// Who the agent is on the platform
#[derive(Debug, Clone)]
pub struct AgentProfile {
    /// Account key, derived from the identity
    pub id: Uuid,
    /// The agent's platform identity
    pub identity: Identity,
    /// Display name
    pub name: String,
}

impl AgentProfile {
    /// Build a profile; the account key is derived from the identity
    #[must_use]
    pub fn new(identity: Identity, name: impl Into<String>) -> Self {
        Self {
            id: memory::account_id(&identity),
            identity,
            name: name.into(),
        }
    }
}

/// Knobs for the ingestion pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Persist the inbound turn before the message-received gate runs,
    /// trading side-effect-free suppression for a complete record
    pub persist_before_gate: bool,
    /// Continuation turns allowed per action invocation
    pub max_continuations: usize,
    /// Queued events per channel before enqueueing blocks
    pub queue_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            persist_before_gate: false,
            max_continuations: 8,
            queue_capacity: 64,
        }
    }
}

/// One agent: profile, extension points, and collaborators
pub struct AgentRuntime {
    pub(crate) profile: AgentProfile,
    pub(crate) hooks: HookRegistry,
    pub(crate) actions: ActionRegistry,
    pub(crate) evaluators: Vec<Arc<dyn Evaluator>>,
    pub(crate) composer: StateComposer,
    pub(crate) generator: Arc<dyn ResponseGenerator>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) store: Arc<dyn MemoryStore>,
    pub(crate) settings: PipelineSettings,
    admin: Option<AdminGuard>,
}

impl AgentRuntime {
    /// Assemble a runtime with no hooks, actions, or evaluators yet
    #[must_use]
    pub fn new(
        profile: AgentProfile,
        composer: StateComposer,
        generator: Arc<dyn ResponseGenerator>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn MemoryStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            profile,
            hooks: HookRegistry::new(),
            actions: ActionRegistry::new(),
            evaluators: Vec::new(),
            composer,
            generator,
            transport,
            store,
            settings,
            admin: None,
        }
    }

    /// The agent's profile
    #[must_use]
    pub const fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    /// The hook registry, for registering and removing handlers
    #[must_use]
    pub const fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// The action table
    #[must_use]
    pub const fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    /// Pipeline settings in effect
    #[must_use]
    pub const fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Register an action handler
    ///
    /// # Errors
    ///
    /// Returns an error if the kind already has a handler.
    pub fn register_action(&mut self, action: RegisteredAction) -> Result<()> {
        tracing::debug!(kind = %action.kind, "action registered");
        self.actions.register(action)
    }

    /// Add a post-reply evaluator; evaluators run in the order added
    pub fn add_evaluator(&mut self, evaluator: Arc<dyn Evaluator>) {
        self.evaluators.push(evaluator);
    }

    /// Accept operator commands signed by this public key
    ///
    /// # Errors
    ///
    /// Returns an error if the key is malformed.
    pub fn set_operator_key(&mut self, public_key_hex: &str) -> Result<()> {
        self.admin = Some(AdminGuard::from_hex(public_key_hex)?);
        Ok(())
    }

    /// Verify and parse an operator envelope
    ///
    /// The caller applies the returned command; the runtime only vouches
    /// for its origin.
    ///
    /// # Errors
    ///
    /// Returns an error if no operator key is configured, the signature
    /// does not verify, or the content is not a known command.
    pub fn handle_admin(&self, envelope: &AdminEnvelope) -> Result<AdminCommand> {
        let guard = self
            .admin
            .as_ref()
            .ok_or_else(|| Error::Security("no operator key configured".to_string()))?;
        let command = guard.verify(envelope)?;
        tracing::info!(?command, "operator command accepted");
        Ok(command)
    }
}

impl fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("profile", &self.profile)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

//! Hook registry: ordered, vetoing subscriber lists per lifecycle point
//!
//! The registry is owned by the runtime instance that created it; there is
//! no process-wide registry. Dispatch walks the handlers registered for the
//! context's point strictly in registration order, awaiting each before the
//! next, and stops at the first `false`. Handler errors are never swallowed;
//! they surface to the pipeline and abort that message.
//!
//! Dispatch iterates a snapshot of the handler list taken at entry, so
//! registering or removing hooks while a dispatch is in flight only affects
//! later dispatches.

pub mod context;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

pub use context::{GateContext, HookContext, HookPoint, MessageReceivedContext, ReviewContext};

use crate::Result;

/// A registered hook handler
///
/// Returning `Ok(false)` vetoes the pipeline at this point; returning an
/// error aborts the message's pipeline entirely.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Inspect (and possibly mutate) the context; decide whether to continue
    async fn run(&self, ctx: &mut HookContext) -> Result<bool>;
}

/// Token identifying one registration; removing it detaches exactly that
/// entry, even when the same handler was registered more than once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

struct HookEntry {
    id: u64,
    hook: Arc<dyn Hook>,
}

/// Ordered subscriber lists per hook point
pub struct HookRegistry {
    next_id: AtomicU64,
    entries: RwLock<HashMap<HookPoint, Vec<HookEntry>>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry").finish_non_exhaustive()
    }
}

impl HookRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler at a point; registration order defines dispatch
    /// order, and the same handler registered twice runs twice
    pub fn on(&self, point: HookPoint, hook: Arc<dyn Hook>) -> HookId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(point).or_default().push(HookEntry { id, hook });
        tracing::debug!(point = %point, id, "hook registered");
        HookId(id)
    }

    /// Remove the single entry created by the given registration
    ///
    /// Returns whether an entry was removed.
    pub fn off(&self, point: HookPoint, id: HookId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = entries.get_mut(&point) else {
            return false;
        };
        let before = list.len();
        list.retain(|entry| entry.id != id.0);
        let removed = list.len() < before;
        if removed {
            tracing::debug!(point = %point, id = id.0, "hook removed");
        }
        removed
    }

    /// Number of handlers registered at a point
    #[must_use]
    pub fn count(&self, point: HookPoint) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&point).map_or(0, Vec::len)
    }

    /// Dispatch the context to every handler at its point, in order
    ///
    /// Returns `Ok(false)` as soon as a handler vetoes; later handlers are
    /// not invoked. With no handlers registered, returns `Ok(true)`.
    ///
    /// # Errors
    ///
    /// Propagates the first handler error unchanged.
    pub async fn dispatch(&self, ctx: &mut HookContext) -> Result<bool> {
        let point = ctx.point();
        let snapshot: Vec<Arc<dyn Hook>> = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries
                .get(&point)
                .map_or_else(Vec::new, |list| list.iter().map(|e| Arc::clone(&e.hook)).collect())
        };

        for (index, hook) in snapshot.iter().enumerate() {
            if !hook.run(ctx).await? {
                tracing::debug!(point = %point, index, "hook vetoed pipeline");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::Utc;

    use crate::channel::ChatChannel;
    use crate::identity::Identity;
    use crate::Error;

    fn received_ctx() -> HookContext {
        let a = Identity::parse(&format!("0x{}", "a".repeat(40))).unwrap();
        let b = Identity::parse(&format!("0x{}", "b".repeat(40))).unwrap();
        HookContext::MessageReceived(MessageReceivedContext {
            channel: ChatChannel::dm(a.clone(), b),
            sender: a,
            text: "hi".to_string(),
            created_at: Utc::now(),
        })
    }

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        verdict: bool,
    }

    #[async_trait]
    impl Hook for Recorder {
        async fn run(&self, _ctx: &mut HookContext) -> Result<bool> {
            self.log.lock().unwrap().push(self.name);
            Ok(self.verdict)
        }
    }

    struct Failing;

    #[async_trait]
    impl Hook for Failing {
        async fn run(&self, _ctx: &mut HookContext) -> Result<bool> {
            Err(Error::Hook("handler exploded".to_string()))
        }
    }

    fn recorder(
        name: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
        verdict: bool,
    ) -> Arc<dyn Hook> {
        Arc::new(Recorder { name, log: Arc::clone(log), verdict })
    }

    #[tokio::test]
    async fn test_dispatch_runs_in_registration_order() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.on(HookPoint::MessageReceived, recorder("h1", &log, true));
        registry.on(HookPoint::MessageReceived, recorder("h2", &log, true));
        registry.on(HookPoint::MessageReceived, recorder("h3", &log, true));

        let verdict = registry.dispatch(&mut received_ctx()).await.unwrap();
        assert!(verdict);
        assert_eq!(*log.lock().unwrap(), vec!["h1", "h2", "h3"]);
    }

    #[tokio::test]
    async fn test_first_false_stops_iteration() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.on(HookPoint::MessageReceived, recorder("h1", &log, true));
        registry.on(HookPoint::MessageReceived, recorder("h2", &log, false));
        registry.on(HookPoint::MessageReceived, recorder("h3", &log, true));

        let verdict = registry.dispatch(&mut received_ctx()).await.unwrap();
        assert!(!verdict);
        assert_eq!(*log.lock().unwrap(), vec!["h1", "h2"]);
    }

    #[tokio::test]
    async fn test_empty_registry_continues() {
        let registry = HookRegistry::new();
        assert!(registry.dispatch(&mut received_ctx()).await.unwrap());
    }

    #[tokio::test]
    async fn test_same_handler_twice_runs_twice() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let hook = recorder("h", &log, true);
        registry.on(HookPoint::MessageReceived, Arc::clone(&hook));
        registry.on(HookPoint::MessageReceived, hook);

        registry.dispatch(&mut received_ctx()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["h", "h"]);
    }

    #[tokio::test]
    async fn test_off_removes_exactly_one_registration() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let hook = recorder("h", &log, true);
        let first = registry.on(HookPoint::MessageReceived, Arc::clone(&hook));
        registry.on(HookPoint::MessageReceived, hook);

        assert!(registry.off(HookPoint::MessageReceived, first));
        assert_eq!(registry.count(HookPoint::MessageReceived), 1);

        registry.dispatch(&mut received_ctx()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["h"]);

        // Second removal of the same token is a no-op
        assert!(!registry.off(HookPoint::MessageReceived, first));
    }

    #[tokio::test]
    async fn test_off_wrong_point_is_noop() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = registry.on(HookPoint::BeforeGeneration, recorder("h", &log, true));
        assert!(!registry.off(HookPoint::AfterGeneration, id));
        assert_eq!(registry.count(HookPoint::BeforeGeneration), 1);
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.on(HookPoint::MessageReceived, Arc::new(Failing));
        registry.on(HookPoint::MessageReceived, recorder("after", &log, true));

        let err = registry.dispatch(&mut received_ctx()).await.unwrap_err();
        assert!(matches!(err, Error::Hook(_)));
        assert!(log.lock().unwrap().is_empty());
    }

    struct SelfRegistering {
        registry: Arc<HookRegistry>,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Hook for SelfRegistering {
        async fn run(&self, _ctx: &mut HookContext) -> Result<bool> {
            self.log.lock().unwrap().push("registering");
            let late = recorder("late", &self.log, true);
            self.registry.on(HookPoint::MessageReceived, late);
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_registration_during_dispatch_affects_later_dispatches_only() {
        let registry = Arc::new(HookRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.on(
            HookPoint::MessageReceived,
            Arc::new(SelfRegistering { registry: Arc::clone(&registry), log: Arc::clone(&log) }),
        );

        registry.dispatch(&mut received_ctx()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["registering"]);

        registry.dispatch(&mut received_ctx()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["registering", "registering", "late"]);
    }

    struct StateTagger(&'static str);

    #[async_trait]
    impl Hook for StateTagger {
        async fn run(&self, ctx: &mut HookContext) -> Result<bool> {
            if let Some(state) = ctx.state_mut() {
                state.knowledge.push(self.0.to_string());
            }
            Ok(true)
        }
    }

    struct StateChecker {
        expected: &'static str,
        seen: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl Hook for StateChecker {
        async fn run(&self, ctx: &mut HookContext) -> Result<bool> {
            let found = ctx
                .state()
                .is_some_and(|state| state.knowledge.iter().any(|k| k == self.expected));
            *self.seen.lock().unwrap() = found;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_later_handlers_see_earlier_state_mutations() {
        use uuid::Uuid;

        use crate::memory::Memory;
        use crate::state::ConversationState;

        let registry = HookRegistry::new();
        let seen = Arc::new(Mutex::new(false));
        registry.on(HookPoint::BeforeGeneration, Arc::new(StateTagger("inserted-fact")));
        registry.on(
            HookPoint::BeforeGeneration,
            Arc::new(StateChecker { expected: "inserted-fact", seen: Arc::clone(&seen) }),
        );

        let agent_id = Uuid::new_v4();
        let mut ctx = HookContext::BeforeGeneration(GateContext {
            memory: Memory::ephemeral(agent_id, Uuid::new_v4(), "hi".to_string()),
            responses: Vec::new(),
            state: ConversationState::empty(agent_id, "orin".to_string(), Uuid::new_v4()),
        });
        registry.dispatch(&mut ctx).await.unwrap();
        assert!(*seen.lock().unwrap());
        assert_eq!(ctx.into_state().unwrap().knowledge, vec!["inserted-fact".to_string()]);
    }
}

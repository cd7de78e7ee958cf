//! Post-reply evaluators
//!
//! Evaluators observe a completed exchange after the reply step. They run
//! sequentially, may have side effects (indexing, scoring), and can never
//! veto or alter the pipeline. A failing evaluator is logged and skipped.

use std::sync::Arc;

use async_trait::async_trait;

use crate::memory::Memory;
use crate::state::ConversationState;
use crate::Result;

/// Observer invoked once per pipeline run after the reply step
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Stable name used in logs
    fn name(&self) -> &'static str;

    /// Inspect the triggering turn and final state
    ///
    /// # Errors
    ///
    /// Implementations may fail; failures are contained by [`run_all`].
    async fn evaluate(&self, memory: &Memory, state: &ConversationState) -> Result<()>;
}

/// Run every evaluator in order, containing individual failures
pub async fn run_all(
    evaluators: &[Arc<dyn Evaluator>],
    memory: &Memory,
    state: &ConversationState,
) {
    for evaluator in evaluators {
        if let Err(error) = evaluator.evaluate(memory, state).await {
            tracing::warn!(
                evaluator = evaluator.name(),
                error = %error,
                "evaluator failed"
            );
        }
    }
}

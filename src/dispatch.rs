//! Per-channel serialization of inbound events
//!
//! Every canonical channel key gets its own worker task and bounded queue,
//! spawned on first use. Events for one channel are handled strictly in
//! arrival order; distinct channels run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::channel::ChatChannel;
use crate::error::{Error, Result};
use crate::runtime::AgentRuntime;

struct Lane {
    feed: mpsc::Sender<serde_json::Value>,
    worker: JoinHandle<()>,
}

/// Routes inbound events to one worker task per channel
pub struct Dispatcher {
    runtime: Arc<AgentRuntime>,
    lanes: Mutex<HashMap<String, Lane>>,
    capacity: usize,
}

impl Dispatcher {
    /// Create a dispatcher over a shared runtime
    #[must_use]
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        let capacity = runtime.settings().queue_capacity.max(1);
        Self {
            runtime,
            lanes: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Queue an inbound event for its channel's worker
    ///
    /// The call waits while the channel's queue is full, so producers see
    /// backpressure per channel rather than unbounded buffering.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dispatch`] if the channel's worker is gone.
    pub async fn enqueue(&self, channel: &ChatChannel, payload: serde_json::Value) -> Result<()> {
        let key = channel.to_string();
        let feed = {
            let mut lanes = self.lanes.lock().await;
            let lane = lanes.entry(key.clone()).or_insert_with(|| {
                Self::spawn_lane(Arc::clone(&self.runtime), channel.clone(), self.capacity)
            });
            lane.feed.clone()
        };

        if feed.send(payload).await.is_err() {
            // Worker panicked or was aborted; a later enqueue respawns it.
            self.lanes.lock().await.remove(&key);
            return Err(Error::Dispatch(format!("worker for {key} is gone")));
        }
        Ok(())
    }

    fn spawn_lane(runtime: Arc<AgentRuntime>, channel: ChatChannel, capacity: usize) -> Lane {
        let (feed, mut intake) = mpsc::channel(capacity);
        let worker = tokio::spawn(async move {
            tracing::debug!(channel = %channel, "channel worker started");
            while let Some(payload) = intake.recv().await {
                match runtime.process_event(&channel, payload).await {
                    Ok(outcome) => {
                        tracing::debug!(channel = %channel, ?outcome, "event handled");
                    }
                    Err(e) => {
                        tracing::error!(channel = %channel, error = %e, "event processing failed");
                    }
                }
            }
            tracing::debug!(channel = %channel, "channel worker stopped");
        });
        Lane { feed, worker }
    }

    /// Number of channels with a live worker
    pub async fn active_lanes(&self) -> usize {
        self.lanes.lock().await.len()
    }

    /// Close every intake queue and wait for the workers to drain
    pub async fn shutdown(self) {
        for (key, lane) in self.lanes.into_inner() {
            drop(lane.feed);
            if let Err(e) = lane.worker.await {
                tracing::warn!(channel = %key, error = %e, "channel worker ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

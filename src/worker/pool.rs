//! Worker pool for multi-worker management.
//!
//! The `WorkerPool` tracks concurrent worker agents, enforces a capacity
//! limit, and fans all of their events into a single channel.

use std::collections::HashMap;

use futures::future::join_all;
use tokio::sync::mpsc;

use crate::sandbox::{ContainerConfig, ContainerRuntime};
use crate::worker::{AgentEvent, WorkerAgent, WorkerId};
use crate::{flog, Error, Result};

/// Manages a pool of concurrent worker agents.
pub struct WorkerPool {
    /// All workers ever spawned, terminal ones included, indexed by id.
    workers: HashMap<WorkerId, WorkerAgent>,
    /// Maximum number of simultaneously active workers.
    max_concurrent: usize,
    /// Channel every worker in this pool emits events on.
    event_tx: mpsc::Sender<AgentEvent>,
}

impl WorkerPool {
    pub fn new(max_concurrent: usize, event_tx: mpsc::Sender<AgentEvent>) -> Self {
        Self {
            workers: HashMap::new(),
            max_concurrent,
            event_tx,
        }
    }

    /// Spawn a new worker running the given sandbox config.
    ///
    /// # Errors
    ///
    /// `PoolFull` when the active count is at capacity; any `start` error
    /// otherwise. A worker whose spawn failed is not retained.
    pub async fn spawn(
        &mut self,
        runtime: &ContainerRuntime,
        config: &ContainerConfig,
    ) -> Result<WorkerId> {
        if !self.has_capacity() {
            return Err(Error::PoolFull {
                max: self.max_concurrent,
            });
        }

        let agent = WorkerAgent::new(self.event_tx.clone());
        agent.start(runtime, config).await?;

        let id = agent.id();
        self.workers.insert(id, agent);
        flog!(
            "Pool spawned worker {} ({}/{} active)",
            id.short(),
            self.active_count(),
            self.max_concurrent
        );
        Ok(id)
    }

    pub fn get(&self, id: &WorkerId) -> Option<&WorkerAgent> {
        self.workers.get(id)
    }

    /// Stop one worker and wait for it to settle.
    ///
    /// # Errors
    ///
    /// `WorkerNotFound` if the id is not in the pool.
    pub async fn stop(&self, id: &WorkerId) -> Result<()> {
        let agent = self
            .workers
            .get(id)
            .ok_or(Error::WorkerNotFound { id: *id })?;
        agent.stop();
        let _ = agent.wait().await;
        Ok(())
    }

    /// Drop a terminal worker from the table.
    ///
    /// # Errors
    ///
    /// `WorkerNotFound` if the id is not in the pool.
    pub fn remove(&mut self, id: &WorkerId) -> Result<()> {
        self.workers
            .remove(id)
            .map(|_| ())
            .ok_or(Error::WorkerNotFound { id: *id })
    }

    /// Number of workers not yet in a terminal state.
    pub fn active_count(&self) -> usize {
        self.workers
            .values()
            .filter(|w| !w.status().is_terminal())
            .count()
    }

    pub fn has_capacity(&self) -> bool {
        self.active_count() < self.max_concurrent
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Stop every active worker in parallel and wait for all of them.
    pub async fn stop_all(&self) {
        let active: Vec<&WorkerAgent> = self
            .workers
            .values()
            .filter(|w| !w.status().is_terminal())
            .collect();
        flog!("Pool stopping {} active workers", active.len());

        join_all(active.into_iter().map(|agent| async move {
            agent.stop();
            let _ = agent.wait().await;
        }))
        .await;
    }
}

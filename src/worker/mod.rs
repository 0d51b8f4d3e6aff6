//! Worker lifecycle: one agent per sandboxed process.

pub mod agent;
pub mod pool;

pub use agent::WorkerAgent;
pub use pool::WorkerPool;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::StreamEvent;

/// Unique identifier for a worker agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a worker agent.
///
/// Legal transitions: `Idle -> Starting -> Running -> {Stopping -> Completed,
/// Completed, Failed}`. Spawn failure short-circuits `Starting -> Failed`.
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Created, not yet started.
    Idle,
    /// Sandbox spawn in flight.
    Starting,
    /// Sandbox process alive, output streaming.
    Running,
    /// Stop requested; waiting for the process to exit.
    Stopping,
    /// Process exited and the run counts as a success.
    Completed,
    /// Spawn failed or the process exited unsuccessfully.
    Failed,
}

impl AgentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Failed)
    }

    /// A process may exist for this worker.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AgentStatus::Starting | AgentStatus::Running | AgentStatus::Stopping
        )
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Starting => "starting",
            AgentStatus::Running => "running",
            AgentStatus::Stopping => "stopping",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Events emitted by worker agents for lifecycle and output changes.
///
/// These allow external components to react to worker activity without
/// polling individual agents.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// The worker's sandbox emitted one protocol record.
    Stream {
        agent_id: WorkerId,
        event: StreamEvent,
    },
    /// The worker finished successfully.
    Completed { agent_id: WorkerId, exit_code: i32 },
    /// The worker failed to start or exited unsuccessfully.
    Failed { agent_id: WorkerId, error: String },
}

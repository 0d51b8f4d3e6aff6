//! Task data model.
//!
//! Tasks live in an external store; foreman consumes the flat shape
//! `{id, title, status, blocked_by[]}` regardless of how it was produced.
//! Graph nodes are rebuilt from this shape on every poll, so nothing here
//! is persisted by foreman itself except through the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task status in its lifecycle.
///
/// `Planned`, `Ready` and `Blocked` are derived during a graph build; the
/// remaining states are owned by the external store (assignment and
/// execution progress) and are passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task exists but readiness has not been derived yet.
    #[default]
    Planned,
    /// All blockers complete; eligible for dispatch.
    Ready,
    /// At least one blocker unresolved or incomplete.
    Blocked,
    /// Queued for dispatch by the orchestrator.
    Pending,
    /// Dispatched to a worker, not yet acknowledged.
    Sent,
    /// A worker is actively executing the task.
    InProgress,
    /// Terminal success.
    Completed,
    /// Terminal failure.
    Failed,
}

impl TaskStatus {
    /// Terminal-success check used for readiness derivation.
    pub fn is_complete(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    /// Whether the status is owned by the external store rather than
    /// derived by the graph build.
    pub fn is_externally_owned(&self) -> bool {
        matches!(
            self,
            TaskStatus::Pending
                | TaskStatus::Sent
                | TaskStatus::InProgress
                | TaskStatus::Completed
                | TaskStatus::Failed
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Planned => "planned",
            TaskStatus::Ready => "ready",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Pending => "pending",
            TaskStatus::Sent => "sent",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Worker assignment recorded against a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Identifier of the worker the task was dispatched to.
    pub agent_id: String,
    pub assigned_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The flat task shape consumed from the external store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Stable, externally assigned identifier.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Ids of tasks that must complete before this one can start.
    #[serde(default, alias = "blockedBy")]
    pub blocked_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
}

impl TaskSpec {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            status: TaskStatus::Planned,
            blocked_by: Vec::new(),
            assignment: None,
        }
    }

    pub fn blocked_by(mut self, ids: &[&str]) -> Self {
        self.blocked_by = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }
}

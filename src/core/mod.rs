//! Task model and dependency graph.

pub mod graph;
pub mod task;

pub use graph::{GraphEdge, TaskGraph, TaskNode};
pub use task::{Assignment, TaskSpec, TaskStatus};

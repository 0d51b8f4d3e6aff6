pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod protocol;
pub mod sandbox;
pub mod state;
pub mod sync;
pub mod worker;

pub use crate::core::{TaskGraph, TaskSpec, TaskStatus};
pub use error::{Error, Result};
pub use worker::{AgentStatus, WorkerAgent, WorkerId};

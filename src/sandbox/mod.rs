//! Sandboxed worker process execution.
//!
//! The sandbox technology itself is external: foreman only builds the
//! runtime CLI invocation (image, mounts, env) and supervises the spawned
//! process. See [`runtime`] for the invocation contract and [`registry`]
//! for the table of live invocations.

pub mod registry;
pub mod runtime;

pub use registry::ProcessRegistry;
pub use runtime::{ContainerConfig, ContainerRuntime, SandboxHandle, SandboxId};

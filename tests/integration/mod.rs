//! Integration test suite for foreman.
//!
//! These tests exercise the full worker pipeline from dispatch to
//! completion, including parallel execution and graceful termination.
//!
//! # Test Categories
//!
//! - `worker_e2e`: Full worker lifecycle against a mock sandbox
//! - `parallel_workers`: Pool concurrency and shared-state correctness
//! - `graph_pipeline`: Task list to dependency graph end to end
//!
//! # CI Compatibility
//!
//! The sandbox runtime is replaced by executable shell scripts written to
//! temporary directories, so no container engine is required.

mod fixtures;

mod graph_pipeline;
mod parallel_workers;
mod worker_e2e;

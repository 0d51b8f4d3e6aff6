//! Table of live sandbox invocations.
//!
//! One manager-owned table replaces any ambient global state: the only
//! legal mutations are spawn inserting an entry, a process's own exit
//! handler removing it, and `stop_all` draining everything.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;

use crate::flog_debug;
use crate::sandbox::runtime::{terminate_with_grace, SandboxId};

#[derive(Debug, Clone, Copy)]
struct RegisteredProcess {
    pid: u32,
    stop_grace: Duration,
}

/// Registry of still-running sandbox processes, keyed by invocation id.
///
/// Clones share the same table, so a handle can remove its own entry when
/// its process exits while the runtime keeps the table for `stop_all`.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<HashMap<SandboxId, RegisteredProcess>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn insert(&self, id: SandboxId, pid: u32, stop_grace: Duration) {
        self.inner
            .lock()
            .await
            .insert(id, RegisteredProcess { pid, stop_grace });
    }

    pub(crate) async fn remove(&self, id: &SandboxId) {
        self.inner.lock().await.remove(id);
    }

    pub async fn contains(&self, id: &SandboxId) -> bool {
        self.inner.lock().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Stop every still-running invocation in parallel, then clear the table.
    ///
    /// The entry set is snapshotted before iterating: exit handlers may
    /// remove their own entries concurrently and must not invalidate the
    /// iteration.
    pub async fn stop_all(&self) {
        let snapshot: Vec<(SandboxId, RegisteredProcess)> = {
            let table = self.inner.lock().await;
            table.iter().map(|(id, p)| (*id, *p)).collect()
        };
        flog_debug!("ProcessRegistry::stop_all count={}", snapshot.len());

        join_all(
            snapshot
                .iter()
                .map(|(_, p)| terminate_with_grace(p.pid, p.stop_grace)),
        )
        .await;

        self.inner.lock().await.clear();
    }
}

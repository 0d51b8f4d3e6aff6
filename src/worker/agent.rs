//! One worker agent driving one sandboxed process.
//!
//! The agent owns the lifecycle state machine and a monitor task that
//! streams the sandbox's stdout through the protocol parser. All handle
//! access happens inside the monitor; `stop` only flips state and fires
//! the cancellation token, so there is no contention over the child.

use std::sync::{Arc, RwLock};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::protocol::{StreamEvent, StreamParser};
use crate::sandbox::{ContainerConfig, ContainerRuntime, SandboxHandle};
use crate::worker::{AgentEvent, AgentStatus, WorkerId};
use crate::{flog, flog_debug, flog_error, Error, Result};

/// A worker agent bound to at most one sandbox invocation.
///
/// Cheap to clone; clones share status, event log and monitor.
#[derive(Clone)]
pub struct WorkerAgent {
    id: WorkerId,
    status: Arc<RwLock<AgentStatus>>,
    /// Every protocol event the sandbox emitted, in arrival order.
    events: Arc<RwLock<Vec<StreamEvent>>>,
    event_tx: mpsc::Sender<AgentEvent>,
    cancel: CancellationToken,
    exit_code: Arc<RwLock<Option<i32>>>,
    monitor: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl WorkerAgent {
    pub fn new(event_tx: mpsc::Sender<AgentEvent>) -> Self {
        Self {
            id: WorkerId::new(),
            status: Arc::new(RwLock::new(AgentStatus::Idle)),
            events: Arc::new(RwLock::new(Vec::new())),
            event_tx,
            cancel: CancellationToken::new(),
            exit_code: Arc::new(RwLock::new(None)),
            monitor: Arc::new(Mutex::new(None)),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn status(&self) -> AgentStatus {
        *read_lock(&self.status)
    }

    fn set_status(&self, status: AgentStatus) {
        *write_lock(&self.status) = status;
    }

    /// Snapshot of the event log so far.
    pub fn events(&self) -> Vec<StreamEvent> {
        read_lock(&self.events).clone()
    }

    pub fn event_count(&self) -> usize {
        read_lock(&self.events).len()
    }

    /// Text of the final result record, if one arrived.
    pub fn result_text(&self) -> Option<String> {
        read_lock(&self.events)
            .iter()
            .rev()
            .find(|e| e.is_result())
            .and_then(|e| e.text())
    }

    /// Start the worker: spawn the sandbox and begin streaming its output.
    ///
    /// Only legal from `Idle`. A spawn failure moves the agent to `Failed`
    /// and surfaces the underlying error.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` when the agent has already been started;
    /// `Spawn` (and others from the runtime) when the sandbox could not
    /// be created.
    pub async fn start(&self, runtime: &ContainerRuntime, config: &ContainerConfig) -> Result<()> {
        {
            let mut status = write_lock(&self.status);
            if *status != AgentStatus::Idle {
                return Err(Error::InvalidTransition {
                    from: status.to_string(),
                    to: AgentStatus::Starting.to_string(),
                });
            }
            *status = AgentStatus::Starting;
        }
        flog!("Worker {} starting (image={})", self.id.short(), config.image);

        let mut handle = match runtime.spawn(config).await {
            Ok(handle) => handle,
            Err(e) => {
                self.set_status(AgentStatus::Failed);
                let _ = self
                    .event_tx
                    .send(AgentEvent::Failed {
                        agent_id: self.id,
                        error: e.to_string(),
                    })
                    .await;
                return Err(e);
            }
        };

        let stdout = handle.take_stdout();
        if let Some(stderr) = handle.take_stderr() {
            let worker = self.id;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    flog_debug!("Worker {} stderr: {}", worker.short(), line);
                }
            });
        }

        // A stop request may have landed while the spawn was in flight;
        // Stopping wins and the monitor settles the run as a deliberate
        // shutdown.
        {
            let mut status = write_lock(&self.status);
            if *status == AgentStatus::Starting {
                *status = AgentStatus::Running;
            }
        }

        let agent = self.clone();
        let task = tokio::spawn(async move {
            agent.monitor(handle, stdout).await;
        });
        *self.monitor.lock().await = Some(task);

        Ok(())
    }

    /// Request a graceful stop.
    ///
    /// From `Starting` or `Running` this moves the agent to `Stopping` and
    /// asks the monitor to terminate the sandbox; the eventual exit is then
    /// recorded as `Completed`. From any other state this is a no-op.
    pub fn stop(&self) {
        let mut status = write_lock(&self.status);
        match *status {
            AgentStatus::Starting | AgentStatus::Running => {
                *status = AgentStatus::Stopping;
                drop(status);
                flog!("Worker {} stop requested", self.id.short());
                self.cancel.cancel();
            }
            _ => {}
        }
    }

    /// Wait for the worker to reach a terminal state.
    ///
    /// # Errors
    ///
    /// `Validation` if the worker was never started; `WorkerExit` carrying
    /// the exit code when the run ended in `Failed`.
    pub async fn wait(&self) -> Result<i32> {
        let task = self.monitor.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }

        let code = match *read_lock(&self.exit_code) {
            Some(code) => code,
            None => {
                return Err(Error::Validation(format!(
                    "worker {} was never started",
                    self.id.short()
                )))
            }
        };
        match self.status() {
            AgentStatus::Failed => Err(Error::WorkerExit { exit_code: code }),
            _ => Ok(code),
        }
    }

    /// Read stdout to EOF, feeding the protocol parser, then settle the
    /// final state from the exit code and the presence of a result record.
    async fn monitor(&self, mut handle: SandboxHandle, stdout: Option<tokio::process::ChildStdout>) {
        let mut parser = StreamParser::new();
        let mut saw_result = false;
        let mut stop_issued = false;

        if let Some(mut stdout) = stdout {
            let mut buf = [0u8; 4096];
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled(), if !stop_issued => {
                        handle.stop().await;
                        stop_issued = true;
                    }
                    read = stdout.read(&mut buf) => {
                        match read {
                            Ok(0) => break,
                            Ok(n) => {
                                for event in parser.write(&buf[..n]) {
                                    saw_result |= event.is_result();
                                    self.record(event).await;
                                }
                            }
                            Err(e) => {
                                flog_error!(
                                    "Worker {} stdout read failed: {}",
                                    self.id.short(),
                                    e
                                );
                                break;
                            }
                        }
                    }
                }
            }
        }
        for event in parser.end() {
            saw_result |= event.is_result();
            self.record(event).await;
        }

        let exit_code = match handle.wait().await {
            Ok(code) => code,
            Err(e) => {
                flog_error!("Worker {} wait failed: {}", self.id.short(), e);
                -1
            }
        };
        *write_lock(&self.exit_code) = Some(exit_code);

        let was_stopping = self.status() == AgentStatus::Stopping;
        if was_stopping || exit_code == 0 || saw_result {
            self.set_status(AgentStatus::Completed);
            flog!("Worker {} completed (exit={})", self.id.short(), exit_code);
            let _ = self
                .event_tx
                .send(AgentEvent::Completed {
                    agent_id: self.id,
                    exit_code,
                })
                .await;
        } else {
            self.set_status(AgentStatus::Failed);
            flog!("Worker {} failed (exit={})", self.id.short(), exit_code);
            let _ = self
                .event_tx
                .send(AgentEvent::Failed {
                    agent_id: self.id,
                    error: format!("worker exited with code {}", exit_code),
                })
                .await;
        }
    }

    async fn record(&self, event: StreamEvent) {
        write_lock(&self.events).push(event.clone());
        let _ = self
            .event_tx
            .send(AgentEvent::Stream {
                agent_id: self.id,
                event,
            })
            .await;
    }
}

impl std::fmt::Debug for WorkerAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerAgent")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

// A poisoned lock only means another thread panicked mid-write of a plain
// value; the value itself is still usable.
fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

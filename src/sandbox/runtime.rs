//! Sandbox runtime invocation and process handle.
//!
//! The contract with the sandbox technology is deliberately small: "run
//! image I, mount path P read-write at /workspace, mount path Q read-only
//! at /plan, set env vars, execute with stdin closed". Everything else
//! (networking, credentials, seccomp) is the runtime's concern.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::Config;
use crate::{flog_debug, flog_warn, Error, Result};

/// Unique identifier for one sandbox invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SandboxId(pub Uuid);

impl SandboxId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for SandboxId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SandboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable description of one sandbox invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Container image to run.
    pub image: String,
    /// Host directory mounted read-write at /workspace.
    pub workdir: PathBuf,
    /// Optional host directory mounted read-only at /plan.
    pub plan_dir: Option<PathBuf>,
    /// Prompt handed to the worker as its command argument.
    pub prompt: String,
    /// Environment variables set inside the sandbox. BTreeMap keeps the
    /// built argv deterministic.
    pub env: BTreeMap<String, String>,
    /// Extra runtime flags appended verbatim before the image.
    pub extra_args: Vec<String>,
}

impl ContainerConfig {
    pub fn new(image: &str, workdir: &Path, prompt: &str) -> Self {
        Self {
            image: image.to_string(),
            workdir: workdir.to_path_buf(),
            plan_dir: None,
            prompt: prompt.to_string(),
            env: BTreeMap::new(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_plan_dir(mut self, dir: &Path) -> Self {
        self.plan_dir = Some(dir.to_path_buf());
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_extra_arg(mut self, arg: &str) -> Self {
        self.extra_args.push(arg.to_string());
        self
    }
}

/// Spawns sandboxed worker processes through an external runtime CLI.
pub struct ContainerRuntime {
    /// Path to the sandbox runtime binary.
    binary: PathBuf,
    /// Grace period between TERM and KILL when stopping.
    stop_grace: Duration,
    /// Table of live invocations.
    registry: ProcessRegistryHandle,
}

type ProcessRegistryHandle = crate::sandbox::ProcessRegistry;

impl ContainerRuntime {
    /// Detect the sandbox runtime binary from the loaded config.
    ///
    /// # Errors
    ///
    /// Returns `SandboxNotFound` if the binary is not on PATH.
    pub fn from_config(config: &Config) -> Result<Self> {
        let name = config.effective_sandbox_command();
        let binary =
            which::which(name).map_err(|_| Error::SandboxNotFound(name.to_string()))?;
        Ok(Self {
            binary,
            stop_grace: config.effective_stop_grace(),
            registry: ProcessRegistryHandle::new(),
        })
    }

    /// Create a runtime with a specific binary path.
    ///
    /// Useful for testing or non-standard installations.
    pub fn with_binary(binary: PathBuf) -> Self {
        Self {
            binary,
            stop_grace: Duration::from_millis(crate::config::DEFAULT_STOP_GRACE_MS),
            registry: ProcessRegistryHandle::new(),
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn stop_grace(&self) -> Duration {
        self.stop_grace
    }

    pub fn registry(&self) -> &ProcessRegistryHandle {
        &self.registry
    }

    /// Build the runtime argv for a config. Pure, so it is testable
    /// without a sandbox runtime installed.
    pub fn command_args(config: &ContainerConfig) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        args.push("-v".to_string());
        args.push(format!("{}:/workspace", config.workdir.display()));
        if let Some(plan_dir) = &config.plan_dir {
            args.push("-v".to_string());
            args.push(format!("{}:/plan:ro", plan_dir.display()));
        }
        args.push("-w".to_string());
        args.push("/workspace".to_string());
        for (key, value) in &config.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.extend(config.extra_args.iter().cloned());
        args.push(config.image.clone());
        args.push(config.prompt.clone());
        args
    }

    /// Spawn one sandboxed worker process.
    ///
    /// Stdin is closed immediately (the worker takes no interactive input);
    /// stdout and stderr are piped. The invocation is registered so a
    /// global `stop_all` can reach it.
    ///
    /// # Errors
    ///
    /// Returns `Spawn` if the process could not be started at all. No exit
    /// code is fabricated in that case.
    pub async fn spawn(&self, config: &ContainerConfig) -> Result<SandboxHandle> {
        let args = Self::command_args(config);
        flog_debug!(
            "ContainerRuntime::spawn binary={} image={} workdir={}",
            self.binary.display(),
            config.image,
            config.workdir.display()
        );

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {}", self.binary.display(), e)))?;

        let pid = child
            .id()
            .ok_or_else(|| Error::Spawn("process exited before a pid was assigned".to_string()))?;

        let id = SandboxId::new();
        self.registry.insert(id, pid, self.stop_grace).await;
        flog_debug!("Sandbox spawned: id={} pid={}", id.short(), pid);

        Ok(SandboxHandle {
            id,
            pid,
            stop_grace: self.stop_grace,
            child,
            registry: self.registry.clone(),
        })
    }

    /// Stop every invocation this runtime has spawned and is still running.
    pub async fn stop_all(&self) {
        self.registry.stop_all().await;
    }
}

impl std::fmt::Debug for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerRuntime")
            .field("binary", &self.binary)
            .field("stop_grace", &self.stop_grace)
            .finish()
    }
}

/// Handle to one spawned sandbox process.
pub struct SandboxHandle {
    pub id: SandboxId,
    pid: u32,
    stop_grace: Duration,
    child: tokio::process::Child,
    registry: ProcessRegistryHandle,
}

impl SandboxHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Take ownership of the stdout pipe. Yields `None` on second call.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr pipe.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for the process to exit and return its exit code.
    ///
    /// Removes this invocation from the registry. A process killed by a
    /// signal has no exit code; -1 is reported for it.
    pub async fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().await?;
        self.registry.remove(&self.id).await;
        let code = status.code().unwrap_or(-1);
        flog_debug!("Sandbox exited: id={} code={}", self.id.short(), code);
        Ok(code)
    }

    /// Graceful-then-forced termination: TERM, grace period, then KILL.
    ///
    /// Idempotent. Resolves cleanly whether or not the process had already
    /// exited; stopping an already-dead process is not an error.
    pub async fn stop(&self) {
        terminate_with_grace(self.pid, self.stop_grace).await;
    }
}

impl std::fmt::Debug for SandboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxHandle")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .finish()
    }
}

/// Send `sig` to `pid` via the kill CLI. Returns false when the process is
/// already gone (or the signal could not be delivered).
async fn signal(pid: u32, sig: &str) -> bool {
    Command::new("kill")
        .arg(format!("-{}", sig))
        .arg(pid.to_string())
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// TERM, poll for exit until the grace period lapses, then KILL.
pub(crate) async fn terminate_with_grace(pid: u32, grace: Duration) {
    if !signal(pid, "TERM").await {
        // Already exited.
        return;
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if !signal(pid, "0").await {
            return;
        }
    }

    flog_warn!("Process {} survived TERM for {:?}, sending KILL", pid, grace);
    let _ = signal(pid, "KILL").await;
}

//! Test fixtures for integration tests.
//!
//! Provides mock sandbox scripts standing in for a real container runtime:
//! executable shell scripts that emit protocol NDJSON, block, fail, or
//! resist termination, written into temporary directories.

use std::io::Write as _;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use foreman::sandbox::{ContainerConfig, ContainerRuntime};

/// A mock sandbox: one executable script in its own temp directory.
pub struct MockSandbox {
    _dir: TempDir,
    pub script: PathBuf,
}

impl MockSandbox {
    /// Create a mock whose script body is `body` (run under /bin/sh).
    pub fn new(body: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let script = dir.path().join("mock-sandbox");

        let mut file = std::fs::File::create(&script).expect("Failed to create script");
        writeln!(file, "#!/bin/sh").expect("Failed to write shebang");
        writeln!(file, "{}", body).expect("Failed to write body");
        drop(file);
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod script");

        Self { _dir: dir, script }
    }

    /// A mock that prints the given NDJSON records and exits 0.
    pub fn emitting(records: &[&str]) -> Self {
        let mut body = String::from("printf '%s\\n'");
        for record in records {
            body.push_str(&format!(" \\\n  '{}'", record));
        }
        Self::new(&body)
    }

    /// A mock that blocks until terminated.
    pub fn blocking() -> Self {
        Self::new("exec sleep 30")
    }

    /// A mock that ignores TERM, forcing the KILL escalation.
    pub fn stubborn() -> Self {
        Self::new("trap '' TERM\nwhile true; do sleep 1; done")
    }

    /// A mock that exits with the given code, emitting nothing.
    pub fn failing(code: i32) -> Self {
        Self::new(&format!("exit {}", code))
    }

    /// Runtime using this mock as its sandbox binary, with a short stop
    /// grace so termination tests stay fast.
    pub fn runtime(&self) -> ContainerRuntime {
        ContainerRuntime::with_binary(self.script.clone())
            .with_stop_grace(Duration::from_millis(300))
    }
}

/// A container config with harmless placeholder values; the mock scripts
/// ignore the argv the runtime builds from it.
pub fn worker_config() -> ContainerConfig {
    ContainerConfig::new("worker:latest", Path::new("/tmp"), "do the task")
}

/// Standard happy-path protocol transcript.
pub fn standard_records() -> Vec<&'static str> {
    vec![
        r#"{"type":"init","session_id":"sess-1","model":"worker-v1"}"#,
        r#"{"type":"tool_use","tool_name":"read_file","tool_id":"tool-1","input":{"path":"src/lib.rs"}}"#,
        r#"{"type":"tool_result","tool_id":"tool-1","output":"fn main() {}","is_error":false}"#,
        r#"{"type":"message","role":"assistant","content":"Applying the fix now."}"#,
        r#"{"type":"result","result":"Fixed the bug in src/lib.rs","duration_ms":1200,"num_turns":2}"#,
    ]
}

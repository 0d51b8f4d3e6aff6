use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Sandbox runtime not found: {0}")]
    SandboxNotFound(String),

    #[error("Sandbox could not start: {0}")]
    Spawn(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Worker failed with exit code {exit_code}")]
    WorkerExit { exit_code: i32 },

    #[error("Dependency cycle detected at task: {0}")]
    Cycle(String),

    #[error("Worker pool is full (max: {max})")]
    PoolFull { max: usize },

    #[error("Worker not found: {id}")]
    WorkerNotFound { id: crate::worker::WorkerId },

    #[error("Plan not found: {0}")]
    PlanNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

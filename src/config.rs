use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::{flog_debug, Error, Result};

/// Default grace period before a stubborn sandbox process is force-killed.
pub const DEFAULT_STOP_GRACE_MS: u64 = 2_000;

/// Default container image for worker sandboxes.
pub const DEFAULT_IMAGE: &str = "foreman-worker:latest";

/// Default external sandbox runtime binary.
pub const DEFAULT_SANDBOX_COMMAND: &str = "docker";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// External sandbox runtime binary (e.g. "docker", "podman").
    pub sandbox_command: Option<String>,
    /// Container image used for worker sandboxes.
    pub image: Option<String>,
    /// Milliseconds to wait between SIGTERM and SIGKILL when stopping a worker.
    pub stop_grace_ms: Option<u64>,
    /// Base URL of the tool-forwarding proxy, injected into worker env.
    pub proxy_url: Option<String>,
    /// Directory where plan state documents are kept.
    pub plans_dir: Option<String>,
}

impl Config {
    pub fn foreman_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".foreman"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::foreman_dir()?.join("foreman.toml"))
    }

    pub fn plans_path(&self) -> Result<PathBuf> {
        match &self.plans_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(Self::foreman_dir()?.join("plans")),
        }
    }

    pub fn effective_sandbox_command(&self) -> &str {
        self.sandbox_command.as_deref().unwrap_or(DEFAULT_SANDBOX_COMMAND)
    }

    pub fn effective_image(&self) -> &str {
        self.image.as_deref().unwrap_or(DEFAULT_IMAGE)
    }

    pub fn effective_stop_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.stop_grace_ms.unwrap_or(DEFAULT_STOP_GRACE_MS))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        flog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            flog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        flog_debug!(
            "Config loaded: sandbox_command={:?}, image={:?}, stop_grace_ms={:?}",
            config.sandbox_command,
            config.image,
            config.stop_grace_ms
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.ensure_dirs()?;
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        flog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        let foreman_dir = Self::foreman_dir()?;
        let plans_dir = self.plans_path()?;
        flog_debug!(
            "Config::ensure_dirs foreman={} plans={}",
            foreman_dir.display(),
            plans_dir.display()
        );
        if !foreman_dir.exists() {
            fs::create_dir_all(&foreman_dir)?;
        }
        if !plans_dir.exists() {
            fs::create_dir_all(&plans_dir)?;
        }
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

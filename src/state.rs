//! Plan persistence.
//!
//! Plans are JSON documents on disk, one file per plan id. Every mutation
//! goes through `update`, which runs the whole read-modify-write cycle
//! inside the per-plan mutex; concurrent updates to the same plan are
//! serialized and none of them can overwrite another's changes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::core::{TaskGraph, TaskSpec};
use crate::sync::NamedMutex;
use crate::{flog_debug, Error, Result};

/// One plan document: the task list a graph is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(id: &str, title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            title: title.to_string(),
            tasks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Build the dependency graph for this plan's current task list.
    pub fn graph(&self) -> Result<TaskGraph> {
        TaskGraph::build(&self.tasks)
    }
}

/// Store of plan documents under a single directory.
pub struct PlanStore {
    dir: PathBuf,
    locks: NamedMutex<String>,
}

impl PlanStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            locks: NamedMutex::new(),
        })
    }

    /// Open the store at the configured plans directory.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open(&config.plans_path()?)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Persist a plan, creating or replacing its document.
    pub async fn save(&self, plan: &Plan) -> Result<()> {
        let id = plan.id.clone();
        self.locks
            .run_exclusive(id, || self.write_plan(plan))
            .await
    }

    /// Load a plan by id.
    ///
    /// # Errors
    ///
    /// `PlanNotFound` if no document exists for the id.
    pub async fn load(&self, id: &str) -> Result<Plan> {
        let path = self.path_for(id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::PlanNotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&data)?)
    }

    /// Apply `apply` to the stored plan and persist the result.
    ///
    /// The load, mutation and store all happen inside the plan's mutex, so
    /// two concurrent updates cannot interleave and lose writes. Updates to
    /// different plans proceed in parallel.
    ///
    /// # Errors
    ///
    /// `PlanNotFound` if no document exists for the id.
    pub async fn update<F>(&self, id: &str, apply: F) -> Result<Plan>
    where
        F: FnOnce(&mut Plan),
    {
        self.locks
            .run_exclusive(id.to_string(), || async move {
                let mut plan = self.load(id).await?;
                apply(&mut plan);
                plan.updated_at = Utc::now();
                self.write_plan(&plan).await?;
                Ok(plan)
            })
            .await
    }

    /// Ids of every stored plan.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(id) = name.to_string_lossy().strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn write_plan(&self, plan: &Plan) -> Result<()> {
        let path = self.path_for(&plan.id);
        let data = serde_json::to_vec_pretty(plan)?;
        tokio::fs::write(&path, data).await?;
        flog_debug!("Plan {} written ({} tasks)", plan.id, plan.tasks.len());
        Ok(())
    }
}

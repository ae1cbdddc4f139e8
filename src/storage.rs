//! Task persistence.
//!
//! Tasks are stored as one pretty-printed JSON file per task. Listing
//! orders by file modification time (newest first) and tolerates
//! unreadable files by skipping them.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clog_warn;
use crate::core::{Task, TaskId, TaskStatus};
use crate::error::Result;

/// Default cap on listed tasks.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Lightweight view of a stored task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: TaskId,
    /// First 100 characters of the description.
    pub description: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Persistence backend for tasks.
pub trait Storage: Send + Sync {
    /// Save a task, overwriting any previous version.
    fn save(&self, task: &Task) -> Result<()>;

    /// Load a task by id. `Ok(None)` when the task does not exist.
    fn load(&self, id: &TaskId) -> Result<Option<Task>>;

    /// List task summaries, newest first. The limit caps how many
    /// stored tasks are examined, not how many survive the status
    /// filter.
    fn list(&self, status: Option<TaskStatus>, limit: usize) -> Result<Vec<TaskSummary>>;

    /// Delete a task. Returns whether it existed.
    fn delete(&self, id: &TaskId) -> Result<bool>;
}

fn truncate_description(description: &str) -> String {
    description.chars().take(100).collect()
}

/// File-based storage, one JSON document per task.
pub struct JsonStorage {
    storage_dir: PathBuf,
}

impl JsonStorage {
    /// Create storage under `storage_dir`, creating it if needed.
    pub fn new(storage_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&storage_dir)?;
        Ok(Self { storage_dir })
    }

    fn task_path(&self, id: &TaskId) -> PathBuf {
        self.storage_dir.join(format!("{}.json", id))
    }

    fn read_task_file(path: &PathBuf) -> Result<Task> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl Storage for JsonStorage {
    fn save(&self, task: &Task) -> Result<()> {
        let mut value = serde_json::to_value(task)?;
        if let Some(object) = value.as_object_mut() {
            object.insert(
                "last_updated".to_string(),
                serde_json::json!(Utc::now()),
            );
        }
        let contents = serde_json::to_string_pretty(&value)?;
        fs::write(self.task_path(&task.id), contents)?;
        Ok(())
    }

    fn load(&self, id: &TaskId) -> Result<Option<Task>> {
        let path = self.task_path(id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Self::read_task_file(&path)?))
    }

    fn list(&self, status: Option<TaskStatus>, limit: usize) -> Result<Vec<TaskSummary>> {
        let mut files: Vec<(PathBuf, SystemTime)> = Vec::new();
        for entry in fs::read_dir(&self.storage_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((path, modified));
        }
        files.sort_by(|a, b| b.1.cmp(&a.1));

        let mut summaries = Vec::new();
        for (path, _) in files.into_iter().take(limit) {
            let contents = match fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(err) => {
                    clog_warn!("Skipping unreadable task file {}: {}", path.display(), err);
                    continue;
                }
            };
            let value: serde_json::Value = match serde_json::from_str(&contents) {
                Ok(value) => value,
                Err(err) => {
                    clog_warn!("Skipping malformed task file {}: {}", path.display(), err);
                    continue;
                }
            };
            let task: Task = match serde_json::from_value(value.clone()) {
                Ok(task) => task,
                Err(err) => {
                    clog_warn!("Skipping malformed task file {}: {}", path.display(), err);
                    continue;
                }
            };
            if let Some(wanted) = status {
                if task.status != wanted {
                    continue;
                }
            }
            let last_updated = value
                .get("last_updated")
                .and_then(|v| serde_json::from_value(v.clone()).ok());
            summaries.push(TaskSummary {
                task_id: task.id,
                description: truncate_description(&task.description),
                status: task.status,
                created_at: task.created_at,
                last_updated,
            });
        }

        Ok(summaries)
    }

    fn delete(&self, id: &TaskId) -> Result<bool> {
        let path = self.task_path(id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }
}

/// In-memory storage for tests. Preserves insertion recency for list
/// ordering.
pub struct MemoryStorage {
    tasks: RwLock<HashMap<TaskId, (Task, DateTime<Utc>, usize)>>,
    counter: RwLock<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            counter: RwLock::new(0),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn save(&self, task: &Task) -> Result<()> {
        let mut counter = self
            .counter
            .write()
            .map_err(|_| crate::error::Error::Validation("storage lock poisoned".to_string()))?;
        *counter += 1;
        let sequence = *counter;
        let mut tasks = self
            .tasks
            .write()
            .map_err(|_| crate::error::Error::Validation("storage lock poisoned".to_string()))?;
        tasks.insert(task.id, (task.clone(), Utc::now(), sequence));
        Ok(())
    }

    fn load(&self, id: &TaskId) -> Result<Option<Task>> {
        let tasks = self
            .tasks
            .read()
            .map_err(|_| crate::error::Error::Validation("storage lock poisoned".to_string()))?;
        Ok(tasks.get(id).map(|(task, _, _)| task.clone()))
    }

    fn list(&self, status: Option<TaskStatus>, limit: usize) -> Result<Vec<TaskSummary>> {
        let tasks = self
            .tasks
            .read()
            .map_err(|_| crate::error::Error::Validation("storage lock poisoned".to_string()))?;
        let mut entries: Vec<&(Task, DateTime<Utc>, usize)> = tasks.values().collect();
        entries.sort_by(|a, b| b.2.cmp(&a.2));

        let mut summaries = Vec::new();
        for (task, updated, _) in entries.into_iter().take(limit) {
            if let Some(wanted) = status {
                if task.status != wanted {
                    continue;
                }
            }
            summaries.push(TaskSummary {
                task_id: task.id,
                description: truncate_description(&task.description),
                status: task.status,
                created_at: task.created_at,
                last_updated: Some(*updated),
            });
        }
        Ok(summaries)
    }

    fn delete(&self, id: &TaskId) -> Result<bool> {
        let mut tasks = self
            .tasks
            .write()
            .map_err(|_| crate::error::Error::Validation("storage lock poisoned".to_string()))?;
        Ok(tasks.remove(id).is_some())
    }
}

//! Task data model for orchestrated refinement.
//!
//! Tasks are created once by the orchestrator with their constraints and
//! subtasks attached, then mutated in place by status and output updates
//! as refinement progresses. The core never deletes a task; deletion is a
//! storage-layer concern.

use crate::agent::Capability;
use crate::core::constraint::Constraint;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Unique identifier for a task.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Unique identifier for a subtask within a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubtaskId(pub Uuid);

impl SubtaskId {
    /// Create a new unique subtask identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for SubtaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubtaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SubtaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Status of a task or subtask in its lifecycle.
///
/// The only legal transitions are pending -> in_progress,
/// in_progress -> completed or failed, and any non-terminal state ->
/// cancelled. A terminal state (completed, failed, cancelled) never
/// transitions further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not yet started.
    Pending,
    /// Currently being refined by an agent.
    InProgress,
    /// Finished with an accepted output.
    Completed,
    /// Finished without an accepted output.
    Failed,
    /// Abandoned before completion.
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    /// Check if this status is terminal (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Check if a transition to the target status is legal.
    pub fn can_transition(&self, target: TaskStatus) -> bool {
        if *self == target {
            return false;
        }
        match (self, target) {
            (TaskStatus::Pending, TaskStatus::InProgress) => true,
            (TaskStatus::InProgress, TaskStatus::Completed) => true,
            (TaskStatus::InProgress, TaskStatus::Failed) => true,
            (from, TaskStatus::Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(Error::Validation(format!("unknown status: {}", other))),
        }
    }
}

/// A subtask within a larger task.
///
/// Subtasks are produced by decomposition and tagged with the capability
/// required to execute them. Dependencies may only reference subtasks
/// that appear strictly earlier in the owning task's subtask list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    /// Unique identifier for this subtask.
    pub id: SubtaskId,
    /// What the subtask should accomplish.
    pub description: String,
    /// Capability required to execute this subtask.
    pub required_capability: Capability,
    /// Current lifecycle status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Final output of the subtask's refinement run, if any.
    #[serde(default)]
    pub output: Option<String>,
    /// IDs of subtasks that must complete before this one.
    #[serde(default)]
    pub dependencies: HashSet<SubtaskId>,
}

impl Subtask {
    /// Create a new pending subtask with no dependencies.
    pub fn new(description: &str, required_capability: Capability) -> Self {
        Self {
            id: SubtaskId::new(),
            description: description.to_string(),
            required_capability,
            status: TaskStatus::Pending,
            output: None,
            dependencies: HashSet::new(),
        }
    }

    /// Create a new pending subtask depending on the given subtasks.
    pub fn with_dependencies(
        description: &str,
        required_capability: Capability,
        dependencies: HashSet<SubtaskId>,
    ) -> Self {
        Self {
            dependencies,
            ..Self::new(description, required_capability)
        }
    }

    /// Transition the subtask to a new status.
    ///
    /// # Errors
    /// Returns an error if the transition is not legal.
    pub fn transition(&mut self, target: TaskStatus) -> Result<()> {
        if !self.status.can_transition(target) {
            return Err(Error::InvalidStatusTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        Ok(())
    }
}

/// A complete task with constraints and subtasks.
///
/// Created once by the orchestrator; constraints are immutable once
/// extracted. The subtask list ordering is stable and encodes a
/// topological ordering consistent with each subtask's dependencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// The original task description.
    pub description: String,
    /// Constraints extracted from the description.
    pub constraints: Vec<Constraint>,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Ordered subtasks produced by decomposition.
    pub subtasks: Vec<Subtask>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// Compiled final output, once execution finishes.
    #[serde(default)]
    pub output: Option<String>,
    /// Additional context passed through to agents.
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(
        description: &str,
        constraints: Vec<Constraint>,
        subtasks: Vec<Subtask>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            description: description.to_string(),
            constraints,
            status: TaskStatus::Pending,
            subtasks,
            created_at: Utc::now(),
            output: None,
            context,
        }
    }

    /// Transition the task to a new status.
    ///
    /// # Errors
    /// Returns an error if the transition is not legal.
    pub fn transition(&mut self, target: TaskStatus) -> Result<()> {
        if !self.status.can_transition(target) {
            return Err(Error::InvalidStatusTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        Ok(())
    }

    /// Get a subtask by ID.
    pub fn subtask(&self, id: &SubtaskId) -> Option<&Subtask> {
        self.subtasks.iter().find(|st| st.id == *id)
    }

    /// Get a mutable subtask by ID.
    pub fn subtask_mut(&mut self, id: &SubtaskId) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|st| st.id == *id)
    }

    /// Check if every subtask reached Completed.
    pub fn all_subtasks_completed(&self) -> bool {
        self.subtasks
            .iter()
            .all(|st| st.status == TaskStatus::Completed)
    }
}

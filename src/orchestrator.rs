//! Task orchestration: create, execute, review, list.
//!
//! The orchestrator wires constraint extraction, decomposition, storage,
//! auditing, and the refinement loop into the user-facing operations.
//! Subtasks run strictly in list order; each one is persisted before the
//! next begins so an interrupted run leaves an inspectable trail.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agent::AgentRegistry;
use crate::audit::AuditSink;
use crate::clog;
use crate::core::{constraint, validate_dependencies, Decomposer, Task, TaskId, TaskStatus};
use crate::error::Result;
use crate::refine::{IterationBudget, RefinementLoop, RefinementResult};
use crate::storage::{Storage, TaskSummary};

/// Minimum final score for a subtask to be accepted without perfection.
pub const ACCEPTANCE_THRESHOLD: f64 = 0.8;

/// Result of executing one subtask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskOutcome {
    pub description: String,
    pub success: bool,
    pub output: Option<String>,
}

/// Result of executing a whole task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub completed_subtasks: usize,
    pub total_subtasks: usize,
    pub final_output: String,
    pub outcomes: Vec<SubtaskOutcome>,
}

/// Coordinates the full task lifecycle.
pub struct TaskOrchestrator {
    storage: Arc<dyn Storage>,
    audit: Arc<dyn AuditSink>,
    refinement: RefinementLoop,
    decomposer: Decomposer,
    budget: IterationBudget,
}

impl TaskOrchestrator {
    pub fn new(
        storage: Arc<dyn Storage>,
        audit: Arc<dyn AuditSink>,
        registry: Arc<AgentRegistry>,
        budget: IterationBudget,
    ) -> Self {
        Self {
            storage,
            refinement: RefinementLoop::new(registry, audit.clone()),
            audit,
            decomposer: Decomposer::new(),
            budget,
        }
    }

    /// Access the refinement loop, e.g. for its cancellation token.
    pub fn refinement(&self) -> &RefinementLoop {
        &self.refinement
    }

    /// Create a task: extract constraints, decompose into subtasks, and
    /// persist it in the pending state.
    pub fn create(
        &self,
        description: &str,
        context: HashMap<String, serde_json::Value>,
    ) -> Result<Task> {
        let constraints = constraint::extract(description);
        let subtasks = self.decomposer.decompose(description);
        validate_dependencies(&subtasks)?;

        let task = Task::new(description, constraints, subtasks, context);
        self.storage.save(&task)?;
        clog!(
            "Created task {} with {} subtask(s), {} constraint(s)",
            task.id.short(),
            task.subtasks.len(),
            task.constraints.len()
        );
        self.audit.record(
            &task.id.to_string(),
            "task_created",
            serde_json::json!({
                "description": description,
                "num_subtasks": task.subtasks.len(),
                "num_constraints": task.constraints.len(),
            }),
        );
        Ok(task)
    }

    /// Load a task by id.
    pub fn task(&self, id: &TaskId) -> Result<Option<Task>> {
        self.storage.load(id)
    }

    /// List stored task summaries, newest first.
    pub fn list(&self, status: Option<TaskStatus>, limit: usize) -> Result<Vec<TaskSummary>> {
        self.storage.list(status, limit)
    }

    /// Execute a task's subtasks in order, refining each until accepted.
    ///
    /// A subtask is accepted when its loop converges or its final score
    /// reaches the acceptance threshold. Returns `Ok(None)` when the
    /// task does not exist.
    ///
    /// # Errors
    /// Returns an error when the task is not in a state that allows
    /// starting execution, or on a storage failure.
    pub async fn execute(&self, id: &TaskId) -> Result<Option<ExecutionSummary>> {
        let mut task = match self.storage.load(id)? {
            Some(task) => task,
            None => return Ok(None),
        };

        self.update_status(&mut task, TaskStatus::InProgress)?;

        let mut outcomes = Vec::new();
        for index in 0..task.subtasks.len() {
            let subtask_id = task.subtasks[index].id;
            let description = task.subtasks[index].description.clone();

            task.subtasks[index].transition(TaskStatus::InProgress)?;
            self.save_with_subtask_event(&task, index)?;

            let result = self
                .refinement
                .refine(
                    &description,
                    &task.constraints,
                    &task.context,
                    None,
                    Some(&format!("{}_{}", task.id, subtask_id)),
                    self.budget,
                )
                .await;

            let accepted = result.success || result.final_score >= ACCEPTANCE_THRESHOLD;
            let target = if accepted {
                TaskStatus::Completed
            } else {
                TaskStatus::Failed
            };
            task.subtasks[index].output = result.final_output.clone();
            task.subtasks[index].transition(target)?;
            self.save_with_subtask_event(&task, index)?;

            clog!(
                "Subtask {} of task {} finished: {} (score {:.2})",
                subtask_id.short(),
                task.id.short(),
                target,
                result.final_score
            );
            outcomes.push(SubtaskOutcome {
                description,
                success: accepted,
                output: result.final_output,
            });
        }

        let final_status = if task.all_subtasks_completed() {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };

        let final_output = compile_output(&outcomes);
        task.output = Some(final_output.clone());
        self.update_status(&mut task, final_status)?;

        let completed = task
            .subtasks
            .iter()
            .filter(|st| st.status == TaskStatus::Completed)
            .count();

        Ok(Some(ExecutionSummary {
            task_id: task.id,
            status: final_status,
            completed_subtasks: completed,
            total_subtasks: task.subtasks.len(),
            final_output,
            outcomes,
        }))
    }

    /// Run additional refinement over a task with user feedback folded
    /// into the description. The task's stored output is replaced with
    /// the new final output. Returns `Ok(None)` when the task does not
    /// exist.
    pub async fn review_and_iterate(
        &self,
        id: &TaskId,
        feedback: &str,
    ) -> Result<Option<RefinementResult>> {
        let mut task = match self.storage.load(id)? {
            Some(task) => task,
            None => return Ok(None),
        };

        let description = format!("{}\n\nUser Feedback: {}", task.description, feedback);
        let result = self
            .refinement
            .refine(
                &description,
                &task.constraints,
                &task.context,
                None,
                Some(&task.id.to_string()),
                self.budget,
            )
            .await;

        task.output = result.final_output.clone();
        self.storage.save(&task)?;
        Ok(Some(result))
    }

    fn update_status(&self, task: &mut Task, target: TaskStatus) -> Result<()> {
        task.transition(target)?;
        self.storage.save(task)?;
        self.audit.record(
            &task.id.to_string(),
            "status_updated",
            serde_json::json!({ "new_status": target.to_string() }),
        );
        Ok(())
    }

    fn save_with_subtask_event(&self, task: &Task, index: usize) -> Result<()> {
        self.storage.save(task)?;
        let subtask = &task.subtasks[index];
        self.audit.record(
            &task.id.to_string(),
            "subtask_updated",
            serde_json::json!({
                "subtask_id": subtask.id.to_string(),
                "status": subtask.status.to_string(),
            }),
        );
        Ok(())
    }
}

/// Join subtask outputs into the compiled task output.
fn compile_output(outcomes: &[SubtaskOutcome]) -> String {
    outcomes
        .iter()
        .filter_map(|out| {
            out.output
                .as_deref()
                .filter(|text| !text.is_empty())
                .map(|text| format!("=== {} ===\n{}", out.description, text))
        })
        .collect::<Vec<String>>()
        .join("\n\n")
}

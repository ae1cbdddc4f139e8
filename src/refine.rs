//! Iterative refinement loop.
//!
//! Drives an agent through execute/validate/feedback cycles until the
//! output validates perfectly, the iteration budget runs out, or the
//! agent fails. Each pass is recorded so callers can inspect the full
//! score trajectory afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, AgentInvocation, AgentRegistry};
use crate::audit::AuditSink;
use crate::{clog, clog_error};
use crate::core::Constraint;
use crate::review::{ReviewEngine, ValidationResult};

/// Appended to feedback when the score stops improving.
pub const STALL_NOTE: &str =
    "\n\nNOTE: Previous iteration had similar or better score. Please try a different approach.";

/// How many refinement passes a loop may run. Always by value; the
/// default of 10 matches the standard task budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IterationBudget(usize);

impl IterationBudget {
    pub const fn new(max_iterations: usize) -> Self {
        Self(max_iterations)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl Default for IterationBudget {
    fn default() -> Self {
        Self(10)
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// The output validated with no issues.
    Converged,
    /// The budget ran out (or the loop was cancelled) before perfection.
    Exhausted,
    /// The agent reported a failed execution.
    AgentFailed,
}

/// One recorded pass through the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementIteration {
    pub iteration: usize,
    pub output: String,
    pub validation: ValidationResult,
    pub agent_metadata: HashMap<String, serde_json::Value>,
}

/// The final outcome of a refinement run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementResult {
    /// True only when the loop converged on a perfect output.
    pub success: bool,
    pub state: LoopState,
    /// The last output produced, if any.
    pub final_output: Option<String>,
    pub iterations: Vec<RefinementIteration>,
    pub total_iterations: usize,
    pub final_score: f64,
}

/// Runs tasks through iterative execute/validate/feedback cycles.
pub struct RefinementLoop {
    registry: Arc<AgentRegistry>,
    review: ReviewEngine,
    audit: Arc<dyn AuditSink>,
    cancel: CancellationToken,
}

impl RefinementLoop {
    pub fn new(registry: Arc<AgentRegistry>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            review: ReviewEngine::new(registry.clone()),
            registry,
            audit,
            cancel: CancellationToken::new(),
        }
    }

    /// A token that stops the loop at the next iteration boundary when
    /// cancelled. In-flight agent executions are allowed to finish.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Refine a task until its output validates perfectly or the budget
    /// is spent.
    ///
    /// When `agent` is `None` one is selected from the registry once,
    /// before the first iteration, and reused for every pass. Audit
    /// events are emitted only when `task_id` is provided.
    pub async fn refine(
        &self,
        task_description: &str,
        constraints: &[Constraint],
        context: &HashMap<String, serde_json::Value>,
        agent: Option<Arc<dyn Agent>>,
        task_id: Option<&str>,
        budget: IterationBudget,
    ) -> RefinementResult {
        let mut iterations: Vec<RefinementIteration> = Vec::new();
        let mut current_output: Option<String> = None;
        let mut current_feedback: Option<String> = None;
        let mut cancelled = false;

        let agent = match agent {
            Some(agent) => agent,
            None => {
                let probe = AgentInvocation::new(
                    task_id.unwrap_or("auto"),
                    task_description,
                );
                match self.registry.agent_for(&probe) {
                    Ok(agent) => agent,
                    Err(err) => {
                        clog_error!("Refinement aborted, no agent available: {}", err);
                        return RefinementResult {
                            success: false,
                            state: LoopState::AgentFailed,
                            final_output: None,
                            iterations,
                            total_iterations: 0,
                            final_score: 0.0,
                        };
                    }
                }
            }
        };

        for iteration in 0..budget.get() {
            if self.cancel.is_cancelled() {
                clog!("Refinement cancelled at iteration {}", iteration);
                cancelled = true;
                break;
            }

            if let Some(task_id) = task_id {
                self.audit.record(
                    task_id,
                    "refinement_iteration_start",
                    serde_json::json!({ "iteration": iteration }),
                );
            }

            let mut invocation = AgentInvocation::new(
                format!("{}_{}", task_id.unwrap_or("task"), iteration),
                task_description,
            );
            invocation.context = context.clone();
            invocation.constraints = constraints.to_vec();
            invocation.iteration = iteration;
            invocation.feedback = current_feedback.clone();

            let agent_output = agent.execute(&invocation).await;

            if !agent_output.success {
                if let Some(task_id) = task_id {
                    self.audit.record(
                        task_id,
                        "refinement_iteration_failed",
                        serde_json::json!({
                            "iteration": iteration,
                            "error": agent_output.error,
                        }),
                    );
                }
                return RefinementResult {
                    success: false,
                    state: LoopState::AgentFailed,
                    final_output: current_output,
                    iterations,
                    total_iterations: iteration + 1,
                    final_score: 0.0,
                };
            }

            let output = agent_output.output.unwrap_or_default();
            current_output = Some(output.clone());

            let validation = self
                .review
                .validate(&output, constraints, task_description, iteration)
                .await;

            if let Some(task_id) = task_id {
                self.audit.record(
                    task_id,
                    "refinement_iteration_complete",
                    serde_json::json!({
                        "iteration": iteration,
                        "score": validation.score,
                        "perfect_match": validation.perfect_match,
                        "num_issues": validation.issues.len(),
                    }),
                );
            }

            let perfect = validation.perfect_match;
            let score = validation.score;
            let feedback = validation.feedback.clone();

            iterations.push(RefinementIteration {
                iteration,
                output,
                validation,
                agent_metadata: agent_output.metadata,
            });

            if perfect {
                return RefinementResult {
                    success: true,
                    state: LoopState::Converged,
                    final_output: current_output,
                    total_iterations: iteration + 1,
                    final_score: score,
                    iterations,
                };
            }

            let mut feedback = feedback;
            if iteration > 0 {
                let previous_score = iterations[iteration - 1].validation.score;
                if score <= previous_score {
                    feedback.push_str(STALL_NOTE);
                }
            }
            current_feedback = Some(feedback);
        }

        let final_score = iterations.last().map(|i| i.validation.score).unwrap_or(0.0);
        let total_iterations = if cancelled {
            iterations.len()
        } else {
            budget.get()
        };

        if !cancelled {
            if let Some(task_id) = task_id {
                self.audit.record(
                    task_id,
                    "refinement_max_iterations_reached",
                    serde_json::json!({
                        "total_iterations": budget.get(),
                        "final_score": final_score,
                        "perfect_match": false,
                    }),
                );
            }
        }

        RefinementResult {
            success: false,
            state: LoopState::Exhausted,
            final_output: current_output,
            iterations,
            total_iterations,
            final_score,
        }
    }
}

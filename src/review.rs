//! Output review and validation.
//!
//! Validation runs a mechanical pass over each constraint, then a
//! semantic pass through the registry's review agent. Issues from both
//! passes feed a deterministic scoring rule and a feedback message the
//! refinement loop hands back to the worker agent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::agent::{AgentInvocation, AgentRegistry};
use crate::clog_debug;
use crate::core::Constraint;

/// Score penalty per critical issue.
pub const CRITICAL_PENALTY: f64 = 0.3;
/// Score penalty per warning issue.
pub const WARNING_PENALTY: f64 = 0.1;

/// How bad an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        write!(f, "{}", s)
    }
}

/// A single problem found while validating an output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Which constraint (or review category) the issue belongs to.
    pub constraint: String,
    pub severity: Severity,
    pub description: String,
    pub suggestion: Option<String>,
}

/// The outcome of validating one output.
///
/// Invariant: `perfect_match` is true exactly when `issues` is empty,
/// in which case `score` is 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub perfect_match: bool,
    pub issues: Vec<ValidationIssue>,
    pub score: f64,
    pub feedback: String,
}

impl ValidationResult {
    /// Build a result from collected issues, deriving score, perfect
    /// flag, and feedback.
    pub fn from_issues(issues: Vec<ValidationIssue>, iteration: usize) -> Self {
        let (score, perfect_match) = if issues.is_empty() {
            (1.0, true)
        } else {
            let critical = issues
                .iter()
                .filter(|i| i.severity == Severity::Critical)
                .count();
            let warnings = issues
                .iter()
                .filter(|i| i.severity == Severity::Warning)
                .count();
            let penalty = critical as f64 * CRITICAL_PENALTY + warnings as f64 * WARNING_PENALTY;
            ((1.0 - penalty).max(0.0), false)
        };

        let feedback = generate_feedback(&issues, iteration);

        Self {
            perfect_match,
            issues,
            score,
            feedback,
        }
    }
}

/// Runs constraint validation and semantic review over agent outputs.
pub struct ReviewEngine {
    registry: Arc<AgentRegistry>,
}

impl ReviewEngine {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Validate an output against the constraints and task description.
    ///
    /// The semantic pass degrades gracefully: a missing review agent or a
    /// failed review execution contributes no issues rather than an
    /// error.
    pub async fn validate(
        &self,
        output: &str,
        constraints: &[Constraint],
        task_description: &str,
        iteration: usize,
    ) -> ValidationResult {
        let mut issues: Vec<ValidationIssue> = Vec::new();

        for constraint in constraints {
            if let Some((description, suggestion)) = check_constraint(constraint, output) {
                issues.push(ValidationIssue {
                    constraint: constraint.to_string(),
                    severity: Severity::Critical,
                    description,
                    suggestion: Some(suggestion),
                });
            }
        }

        if let Some(review_agent) = self.registry.review_agent() {
            let mut invocation = AgentInvocation::new(
                format!("review_{}", iteration),
                build_review_prompt(task_description, output, constraints),
            );
            invocation.constraints = constraints.to_vec();
            invocation.iteration = iteration;
            invocation.context.insert(
                "task_description".to_string(),
                serde_json::json!(task_description),
            );
            invocation
                .context
                .insert("output".to_string(), serde_json::json!(output));
            invocation
                .context
                .insert("iteration".to_string(), serde_json::json!(iteration));

            let review_output = review_agent.execute(&invocation).await;
            if review_output.success {
                if let Some(text) = &review_output.output {
                    issues.extend(parse_review_output(text));
                }
            } else {
                clog_debug!(
                    "Review agent failed for iteration {}; skipping semantic pass",
                    iteration
                );
            }
        }

        ValidationResult::from_issues(issues, iteration)
    }
}

/// Mechanical check of one constraint against the output text.
///
/// Returns `Some((description, suggestion))` if the constraint is
/// violated. Test coverage would need parsed test results to verify, so
/// for now every constraint passes here and the review agent carries the
/// semantic judgement.
fn check_constraint(_constraint: &Constraint, _output: &str) -> Option<(String, String)> {
    None
}

/// Build the prompt sent to the review agent.
pub fn build_review_prompt(
    task_description: &str,
    output: &str,
    constraints: &[Constraint],
) -> String {
    let mut prompt = format!(
        "Review the following output for the given task.\n\nTASK:\n{}\n\nCONSTRAINTS:\n",
        task_description
    );
    for (i, constraint) in constraints.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, constraint));
    }
    prompt.push_str(&format!(
        "\nOUTPUT TO REVIEW:\n{}\n\n\
         Please carefully review the output and identify any issues:\n\
         1. Does it fully satisfy the task requirements?\n\
         2. Does it meet all specified constraints?\n\
         3. Are there any errors, inconsistencies, or quality issues?\n\
         4. Is anything missing or incomplete?\n\n\
         Provide specific, actionable feedback for any issues found.\n\
         If the output is perfect, clearly state \"OUTPUT IS PERFECT - ALL CONSTRAINTS MET\".\n",
        output
    ));
    prompt
}

const PROBLEM_WORDS: [&str; 5] = ["error", "issue", "problem", "missing", "incorrect"];
const CRITICAL_WORDS: [&str; 3] = ["error", "critical", "must"];

/// Extract issues from free-form review agent text.
///
/// A perfect-output marker anywhere in the text short-circuits to no
/// issues. Otherwise each line mentioning a problem word becomes one
/// issue, critical if it also carries a critical word.
pub fn parse_review_output(review_text: &str) -> Vec<ValidationIssue> {
    let upper = review_text.to_uppercase();
    if upper.contains("OUTPUT IS PERFECT") || upper.contains("ALL CONSTRAINTS MET") {
        return Vec::new();
    }

    let mut issues = Vec::new();
    for line in review_text.lines() {
        let lower = line.to_lowercase();
        if !PROBLEM_WORDS.iter().any(|w| lower.contains(w)) {
            continue;
        }
        let severity = if CRITICAL_WORDS.iter().any(|w| lower.contains(w)) {
            Severity::Critical
        } else {
            Severity::Warning
        };
        issues.push(ValidationIssue {
            constraint: "Quality Review".to_string(),
            severity,
            description: line.trim().to_string(),
            suggestion: None,
        });
    }
    issues
}

/// Render issues into the feedback message handed to the next iteration.
fn generate_feedback(issues: &[ValidationIssue], iteration: usize) -> String {
    if issues.is_empty() {
        return "Output meets all requirements and constraints. Excellent work!".to_string();
    }

    let mut feedback = format!("Iteration {} - Issues Found:\n\n", iteration + 1);

    let critical: Vec<&ValidationIssue> = issues
        .iter()
        .filter(|i| i.severity == Severity::Critical)
        .collect();
    let warnings: Vec<&ValidationIssue> = issues
        .iter()
        .filter(|i| i.severity == Severity::Warning)
        .collect();

    if !critical.is_empty() {
        feedback.push_str("CRITICAL ISSUES (must fix):\n");
        for (i, issue) in critical.iter().enumerate() {
            feedback.push_str(&format!("{}. {}\n", i + 1, issue.description));
            if let Some(suggestion) = &issue.suggestion {
                feedback.push_str(&format!("   Suggestion: {}\n", suggestion));
            }
        }
        feedback.push('\n');
    }

    if !warnings.is_empty() {
        feedback.push_str("WARNINGS (should fix):\n");
        for (i, issue) in warnings.iter().enumerate() {
            feedback.push_str(&format!("{}. {}\n", i + 1, issue.description));
            if let Some(suggestion) = &issue.suggestion {
                feedback.push_str(&format!("   Suggestion: {}\n", suggestion));
            }
        }
        feedback.push('\n');
    }

    feedback.push_str("Please address these issues in the next iteration.");
    feedback
}

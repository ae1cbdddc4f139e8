//! End-to-end refinement loop tests with scripted agents.

use std::collections::HashMap;
use std::sync::Arc;

use crucible::agent::Capability;
use crucible::refine::{IterationBudget, LoopState, STALL_NOTE};

use crate::fixtures::{
    refinement_loop, FailingAgent, ScriptedAgent, ScriptedReviewer, CRITICAL_REVIEW,
    PERFECT_REVIEW, WARNING_REVIEW,
};

#[tokio::test]
async fn first_perfect_output_converges_in_one_iteration() {
    let worker = Arc::new(ScriptedAgent::new(Capability::General, &["final answer"]));
    let reviewer = Arc::new(ScriptedReviewer::new(&[PERFECT_REVIEW]));
    let (rl, audit) = refinement_loop(vec![worker.clone(), reviewer]);

    let result = rl
        .refine(
            "Summarize the design",
            &[],
            &HashMap::new(),
            None,
            Some("t1"),
            IterationBudget::default(),
        )
        .await;

    assert!(result.success);
    assert_eq!(result.state, LoopState::Converged);
    assert_eq!(result.total_iterations, 1);
    assert_eq!(result.final_score, 1.0);
    assert_eq!(result.final_output.as_deref(), Some("final answer"));
    assert_eq!(result.iterations.len(), 1);
    assert!(result.iterations[0].validation.perfect_match);

    let events: Vec<String> = audit.events().into_iter().map(|e| e.event).collect();
    assert_eq!(
        events,
        vec!["refinement_iteration_start", "refinement_iteration_complete"]
    );
    assert!(worker.invocations()[0].feedback.is_none());
}

#[tokio::test]
async fn persistent_issues_exhaust_the_budget() {
    let worker = Arc::new(ScriptedAgent::new(Capability::General, &["draft"]));
    let reviewer = Arc::new(ScriptedReviewer::new(&[CRITICAL_REVIEW]));
    let (rl, audit) = refinement_loop(vec![worker, reviewer]);

    let result = rl
        .refine(
            "Summarize the design",
            &[],
            &HashMap::new(),
            None,
            Some("t1"),
            IterationBudget::new(3),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.state, LoopState::Exhausted);
    assert_eq!(result.total_iterations, 3);
    assert_eq!(result.iterations.len(), 3);
    // One critical issue each pass keeps the score at 0.7.
    assert!((result.final_score - 0.7).abs() < 1e-9);
    assert_eq!(result.final_output.as_deref(), Some("draft"));

    let events: Vec<String> = audit.events().into_iter().map(|e| e.event).collect();
    assert_eq!(events.last().map(String::as_str), Some("refinement_max_iterations_reached"));
}

#[tokio::test]
async fn stall_note_appears_after_non_improving_score() {
    let worker = Arc::new(ScriptedAgent::new(Capability::General, &["draft"]));
    let reviewer = Arc::new(ScriptedReviewer::new(&[CRITICAL_REVIEW]));
    let (rl, _audit) = refinement_loop(vec![worker.clone(), reviewer]);

    rl.refine(
        "Summarize the design",
        &[],
        &HashMap::new(),
        None,
        Some("t1"),
        IterationBudget::new(3),
    )
    .await;

    let invocations = worker.invocations();
    assert_eq!(invocations.len(), 3);

    // First pass has no feedback at all.
    assert!(invocations[0].feedback.is_none());

    // Second pass carries plain feedback: iteration 0 has no previous
    // score to compare against.
    let second = invocations[1].feedback.as_deref().unwrap();
    assert!(second.starts_with("Iteration 1 - Issues Found:"));
    assert!(!second.contains(STALL_NOTE));

    // Third pass sees the stalled score and gets the note.
    let third = invocations[2].feedback.as_deref().unwrap();
    assert!(third.starts_with("Iteration 2 - Issues Found:"));
    assert!(third.ends_with(STALL_NOTE));
}

#[tokio::test]
async fn improving_scores_never_trigger_the_stall_note() {
    let worker = Arc::new(ScriptedAgent::new(Capability::General, &["draft"]));
    // Two criticals, then one critical, then one warning: 0.4 -> 0.7 -> 0.9.
    let reviewer = Arc::new(ScriptedReviewer::new(&[
        "There is an error here.\nAnother error there.",
        CRITICAL_REVIEW,
        WARNING_REVIEW,
    ]));
    let (rl, _audit) = refinement_loop(vec![worker.clone(), reviewer]);

    let result = rl
        .refine(
            "Summarize the design",
            &[],
            &HashMap::new(),
            None,
            Some("t1"),
            IterationBudget::new(3),
        )
        .await;

    assert_eq!(result.state, LoopState::Exhausted);
    let scores: Vec<f64> = result
        .iterations
        .iter()
        .map(|i| i.validation.score)
        .collect();
    assert!(scores.windows(2).all(|w| w[1] > w[0]));

    for invocation in worker.invocations() {
        if let Some(feedback) = &invocation.feedback {
            assert!(!feedback.contains(STALL_NOTE));
        }
    }
}

#[tokio::test]
async fn agent_failure_ends_the_run() {
    let (rl, audit) = refinement_loop(vec![Arc::new(FailingAgent::new(Capability::General))]);

    let result = rl
        .refine(
            "Summarize the design",
            &[],
            &HashMap::new(),
            None,
            Some("t1"),
            IterationBudget::default(),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.state, LoopState::AgentFailed);
    assert_eq!(result.total_iterations, 1);
    assert_eq!(result.final_score, 0.0);
    assert!(result.iterations.is_empty());
    assert!(result.final_output.is_none());

    let events: Vec<String> = audit.events().into_iter().map(|e| e.event).collect();
    assert_eq!(
        events,
        vec!["refinement_iteration_start", "refinement_iteration_failed"]
    );
}

#[tokio::test]
async fn zero_budget_yields_an_empty_exhausted_run() {
    let worker = Arc::new(ScriptedAgent::new(Capability::General, &["unused"]));
    let (rl, audit) = refinement_loop(vec![worker.clone()]);

    let result = rl
        .refine(
            "Summarize the design",
            &[],
            &HashMap::new(),
            None,
            Some("t1"),
            IterationBudget::new(0),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.state, LoopState::Exhausted);
    assert_eq!(result.total_iterations, 0);
    assert!(result.iterations.is_empty());
    assert_eq!(result.final_score, 0.0);
    assert!(result.final_output.is_none());
    assert!(worker.invocations().is_empty());

    let events: Vec<String> = audit.events().into_iter().map(|e| e.event).collect();
    assert_eq!(events, vec!["refinement_max_iterations_reached"]);
}

#[tokio::test]
async fn cancellation_stops_before_the_next_iteration() {
    let worker = Arc::new(ScriptedAgent::new(Capability::General, &["draft"]));
    let reviewer = Arc::new(ScriptedReviewer::new(&[CRITICAL_REVIEW]));
    let (rl, _audit) = refinement_loop(vec![worker.clone(), reviewer]);
    rl.cancellation_token().cancel();

    let result = rl
        .refine(
            "Summarize the design",
            &[],
            &HashMap::new(),
            None,
            None,
            IterationBudget::new(5),
        )
        .await;

    assert_eq!(result.state, LoopState::Exhausted);
    assert_eq!(result.total_iterations, 0);
    assert!(worker.invocations().is_empty());
}

#[tokio::test]
async fn constraints_and_feedback_reach_the_worker() {
    let worker = Arc::new(ScriptedAgent::new(Capability::General, &["draft"]));
    let reviewer = Arc::new(ScriptedReviewer::new(&[CRITICAL_REVIEW, PERFECT_REVIEW]));
    let (rl, _audit) = refinement_loop(vec![worker.clone(), reviewer]);

    let constraints =
        crucible::core::constraint::extract("Write code with 90% test coverage required");
    assert!(!constraints.is_empty());

    let result = rl
        .refine(
            "Write the module",
            &constraints,
            &HashMap::new(),
            None,
            Some("t1"),
            IterationBudget::new(5),
        )
        .await;

    assert_eq!(result.state, LoopState::Converged);
    assert_eq!(result.total_iterations, 2);

    let invocations = worker.invocations();
    assert_eq!(invocations[0].constraints.len(), constraints.len());
    assert!(invocations[1]
        .feedback
        .as_deref()
        .unwrap()
        .contains("CRITICAL ISSUES (must fix):"));
}

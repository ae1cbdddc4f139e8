//! End-to-end orchestration tests: create, execute, review, list.

use std::sync::Arc;

use crucible::agent::Capability;
use crucible::core::{ConstraintKind, TaskId, TaskStatus};
use crucible::refine::{IterationBudget, LoopState};

use crate::fixtures::{
    harness, no_context, ScriptedAgent, ScriptedReviewer, CRITICAL_REVIEW, PERFECT_REVIEW,
};

#[test]
fn create_decomposes_a_coding_task() {
    let h = harness(Vec::new(), IterationBudget::default());
    let task = h
        .orchestrator
        .create("Implement a function", no_context())
        .unwrap();

    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.subtasks.len(), 1);
    assert_eq!(task.subtasks[0].required_capability, Capability::Coding);
    assert_eq!(task.subtasks[0].description, "Implement: Implement a function");
    assert!(task.subtasks[0].dependencies.is_empty());
    assert!(task.constraints.is_empty());

    // The task is persisted immediately.
    let loaded = h.orchestrator.task(&task.id).unwrap().unwrap();
    assert_eq!(loaded.id, task.id);

    let events: Vec<String> = h.audit.events().into_iter().map(|e| e.event).collect();
    assert_eq!(events, vec!["task_created"]);
}

#[test]
fn create_wires_testing_after_coding() {
    let h = harness(Vec::new(), IterationBudget::default());
    let task = h
        .orchestrator
        .create(
            "Implement a parser and write unit tests with 90% test coverage",
            no_context(),
        )
        .unwrap();

    assert_eq!(task.subtasks.len(), 2);
    assert_eq!(task.subtasks[0].required_capability, Capability::Coding);
    assert_eq!(task.subtasks[1].required_capability, Capability::Testing);
    assert!(task.subtasks[1].dependencies.contains(&task.subtasks[0].id));

    assert!(task
        .constraints
        .iter()
        .any(|c| c.kind == ConstraintKind::TestCoverage));
}

#[tokio::test]
async fn execute_completes_a_task_and_compiles_output() {
    let worker = Arc::new(ScriptedAgent::new(Capability::Coding, &["fn parse() {}"]));
    let reviewer = Arc::new(ScriptedReviewer::new(&[PERFECT_REVIEW]));
    let h = harness(vec![worker, reviewer], IterationBudget::new(3));

    let task = h
        .orchestrator
        .create("Implement a function", no_context())
        .unwrap();
    let summary = h.orchestrator.execute(&task.id).await.unwrap().unwrap();

    assert_eq!(summary.status, TaskStatus::Completed);
    assert_eq!(summary.completed_subtasks, 1);
    assert_eq!(summary.total_subtasks, 1);
    assert_eq!(
        summary.final_output,
        "=== Implement: Implement a function ===\nfn parse() {}"
    );

    let stored = h.orchestrator.task(&task.id).unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.output.as_deref(), Some(summary.final_output.as_str()));
    assert_eq!(stored.subtasks[0].status, TaskStatus::Completed);
    assert_eq!(stored.subtasks[0].output.as_deref(), Some("fn parse() {}"));
}

#[tokio::test]
async fn execute_fails_the_task_when_a_subtask_scores_too_low() {
    let worker = Arc::new(ScriptedAgent::new(Capability::Coding, &["draft"]));
    // Two criticals per pass keeps the score at 0.4, below acceptance.
    let reviewer = Arc::new(ScriptedReviewer::new(&[
        "There is an error here.\nAnother error there.",
    ]));
    let h = harness(vec![worker, reviewer], IterationBudget::new(2));

    let task = h
        .orchestrator
        .create("Implement a function", no_context())
        .unwrap();
    let summary = h.orchestrator.execute(&task.id).await.unwrap().unwrap();

    assert_eq!(summary.status, TaskStatus::Failed);
    assert_eq!(summary.completed_subtasks, 0);

    let stored = h.orchestrator.task(&task.id).unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(stored.subtasks[0].status, TaskStatus::Failed);
    // The last draft is still recorded for inspection.
    assert_eq!(stored.subtasks[0].output.as_deref(), Some("draft"));
}

#[tokio::test]
async fn execute_accepts_a_good_enough_score() {
    let worker = Arc::new(ScriptedAgent::new(Capability::Coding, &["draft"]));
    // One warning per pass: score 0.9, imperfect but above acceptance.
    let reviewer = Arc::new(ScriptedReviewer::new(&[
        "There is a minor issue with formatting.",
    ]));
    let h = harness(vec![worker, reviewer], IterationBudget::new(2));

    let task = h
        .orchestrator
        .create("Implement a function", no_context())
        .unwrap();
    let summary = h.orchestrator.execute(&task.id).await.unwrap().unwrap();

    assert_eq!(summary.status, TaskStatus::Completed);
    assert_eq!(summary.completed_subtasks, 1);
}

#[tokio::test]
async fn execute_runs_subtasks_in_list_order() {
    // Both subtask descriptions embed the original text, which mentions
    // tests, so keyword routing sends both to the testing agent.
    let coder = Arc::new(ScriptedAgent::new(Capability::Coding, &["code"]));
    let tester = Arc::new(ScriptedAgent::new(
        Capability::Testing,
        &["parser code", "parser tests"],
    ));
    let reviewer = Arc::new(ScriptedReviewer::new(&[PERFECT_REVIEW]));
    let h = harness(
        vec![coder.clone(), tester.clone(), reviewer],
        IterationBudget::new(3),
    );

    let task = h
        .orchestrator
        .create("Implement a parser and add unit tests", no_context())
        .unwrap();
    let summary = h.orchestrator.execute(&task.id).await.unwrap().unwrap();

    assert_eq!(summary.status, TaskStatus::Completed);
    assert_eq!(summary.completed_subtasks, 2);
    assert!(coder.invocations().is_empty());

    let invocations = tester.invocations();
    assert_eq!(invocations.len(), 2);
    assert_eq!(invocations[0].description, task.subtasks[0].description);
    assert_eq!(invocations[1].description, task.subtasks[1].description);
    assert_eq!(
        summary.final_output,
        format!(
            "=== {} ===\nparser code\n\n=== {} ===\nparser tests",
            task.subtasks[0].description, task.subtasks[1].description
        )
    );
}

#[tokio::test]
async fn execute_emits_a_full_audit_trail() {
    let worker = Arc::new(ScriptedAgent::new(Capability::Coding, &["code"]));
    let reviewer = Arc::new(ScriptedReviewer::new(&[PERFECT_REVIEW]));
    let h = harness(vec![worker, reviewer], IterationBudget::new(3));

    let task = h
        .orchestrator
        .create("Implement a function", no_context())
        .unwrap();
    h.orchestrator.execute(&task.id).await.unwrap().unwrap();

    let events: Vec<String> = h.audit.events().into_iter().map(|e| e.event).collect();
    assert_eq!(
        events,
        vec![
            "task_created",
            "status_updated",
            "subtask_updated",
            "refinement_iteration_start",
            "refinement_iteration_complete",
            "subtask_updated",
            "status_updated",
        ]
    );
}

#[tokio::test]
async fn execute_unknown_task_returns_none() {
    let h = harness(Vec::new(), IterationBudget::default());
    assert!(h.orchestrator.execute(&TaskId::new()).await.unwrap().is_none());
    assert!(h.orchestrator.task(&TaskId::new()).unwrap().is_none());
    assert!(h
        .orchestrator
        .review_and_iterate(&TaskId::new(), "feedback")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn review_and_iterate_folds_feedback_into_the_description() {
    let worker = Arc::new(ScriptedAgent::new(Capability::Coding, &["revised"]));
    let reviewer = Arc::new(ScriptedReviewer::new(&[PERFECT_REVIEW]));
    let h = harness(vec![worker.clone(), reviewer], IterationBudget::new(3));

    let task = h
        .orchestrator
        .create("Implement a function", no_context())
        .unwrap();

    let result = h
        .orchestrator
        .review_and_iterate(&task.id, "make it faster")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.state, LoopState::Converged);
    assert_eq!(result.final_output.as_deref(), Some("revised"));

    let invocation = &worker.invocations()[0];
    assert_eq!(
        invocation.description,
        "Implement a function\n\nUser Feedback: make it faster"
    );

    let stored = h.orchestrator.task(&task.id).unwrap().unwrap();
    assert_eq!(stored.output.as_deref(), Some("revised"));
}

#[tokio::test]
async fn agent_failure_during_execute_fails_the_subtask() {
    let worker = Arc::new(crate::fixtures::FailingAgent::new(Capability::Coding));
    let h = harness(vec![worker], IterationBudget::new(3));

    let task = h
        .orchestrator
        .create("Implement a function", no_context())
        .unwrap();
    let summary = h.orchestrator.execute(&task.id).await.unwrap().unwrap();

    assert_eq!(summary.status, TaskStatus::Failed);
    assert_eq!(summary.completed_subtasks, 0);
    assert_eq!(summary.final_output, "");
}

#[test]
fn list_filters_by_status_and_orders_newest_first() {
    let h = harness(Vec::new(), IterationBudget::default());
    let first = h.orchestrator.create("first task", no_context()).unwrap();
    let second = h.orchestrator.create("second task", no_context()).unwrap();

    let all = h.orchestrator.list(None, 100).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].task_id, second.id);
    assert_eq!(all[1].task_id, first.id);

    let pending = h.orchestrator.list(Some(TaskStatus::Pending), 100).unwrap();
    assert_eq!(pending.len(), 2);
    let completed = h
        .orchestrator
        .list(Some(TaskStatus::Completed), 100)
        .unwrap();
    assert!(completed.is_empty());
}

#[test]
fn stall_review_strings_stay_in_sync_with_the_parser() {
    // Guards the fixtures against drifting away from the review
    // vocabulary they are meant to trigger.
    let critical = crucible::review::parse_review_output(CRITICAL_REVIEW);
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].severity, crucible::review::Severity::Critical);
}

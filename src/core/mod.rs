//! Core domain types: tasks, constraints, classification, decomposition.

pub mod classify;
pub mod constraint;
pub mod decompose;
pub mod task;

pub use classify::{Classifier, KeywordClassifier, Tag};
pub use constraint::{Constraint, ConstraintKind, ConstraintValue};
pub use decompose::{dependency_order, validate_dependencies, Decomposer};
pub use task::{Subtask, SubtaskId, Task, TaskId, TaskStatus};

//! Task decomposition into capability-tagged subtasks.
//!
//! Decomposition is deterministic and keyword-driven via the
//! [`Classifier`] seam. Rules are applied in a fixed order: coding first
//! (no dependencies), then testing (depends on the coding subtask if one
//! was emitted), then documentation (depends on everything emitted so
//! far). A description matching none of the three families yields exactly
//! one general-purpose subtask carrying the full description.
//!
//! Because every emitted subtask only ever depends on strictly earlier
//! subtasks, the emission order is itself a topological order and the
//! dependency graph is acyclic by construction.

use crate::agent::Capability;
use crate::core::classify::{Classifier, KeywordClassifier, Tag};
use crate::core::task::{Subtask, SubtaskId};
use crate::error::{Error, Result};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// Splits task descriptions into ordered subtask lists.
pub struct Decomposer {
    classifier: Box<dyn Classifier>,
}

impl Decomposer {
    /// Create a decomposer using the default keyword classifier.
    pub fn new() -> Self {
        Self {
            classifier: Box::new(KeywordClassifier::new()),
        }
    }

    /// Create a decomposer with a custom classifier.
    pub fn with_classifier(classifier: Box<dyn Classifier>) -> Self {
        Self { classifier }
    }

    /// Decompose a description into an ordered list of subtasks.
    ///
    /// Constraints are attached to the parent task by the orchestrator
    /// and are not consulted here.
    pub fn decompose(&self, description: &str) -> Vec<Subtask> {
        let tags = self.classifier.classify(description);
        let mut subtasks: Vec<Subtask> = Vec::new();

        if tags.contains(&Tag::Coding) {
            subtasks.push(Subtask::new(
                &format!("Implement: {}", description),
                Capability::Coding,
            ));
        }

        if tags.contains(&Tag::Testing) {
            let dependencies: HashSet<SubtaskId> = subtasks
                .first()
                .map(|st| [st.id].into_iter().collect())
                .unwrap_or_default();
            subtasks.push(Subtask::with_dependencies(
                &format!("Create tests for: {}", description),
                Capability::Testing,
                dependencies,
            ));
        }

        if tags.contains(&Tag::Documentation) {
            let dependencies: HashSet<SubtaskId> = subtasks.iter().map(|st| st.id).collect();
            subtasks.push(Subtask::with_dependencies(
                &format!("Generate documentation for: {}", description),
                Capability::Documentation,
                dependencies,
            ));
        }

        if subtasks.is_empty() {
            subtasks.push(Subtask::new(description, Capability::General));
        }

        subtasks
    }
}

impl Default for Decomposer {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a subtask list's dependency structure.
///
/// Every dependency must reference a subtask appearing strictly earlier
/// in the list; a forward reference, an unknown id, or a cycle is a
/// construction error.
pub fn validate_dependencies(subtasks: &[Subtask]) -> Result<()> {
    let mut seen: HashSet<SubtaskId> = HashSet::new();
    for subtask in subtasks {
        for dep in &subtask.dependencies {
            if !seen.contains(dep) {
                return Err(Error::Validation(format!(
                    "subtask {} depends on {}, which does not appear earlier in the list",
                    subtask.id.short(),
                    dep.short()
                )));
            }
        }
        seen.insert(subtask.id);
    }

    // The earlier-ids-only rule already rules out cycles; the graph check
    // guards against callers that bypass it with hand-built lists.
    let graph = dependency_graph(subtasks);
    if is_cyclic_directed(&graph) {
        return Err(Error::Validation(
            "subtask dependency graph contains a cycle".to_string(),
        ));
    }

    Ok(())
}

/// Return subtask IDs in a dependency-respecting order.
///
/// For decomposer output this matches the emission order. Provided for
/// hosts that want an explicit topological ordering; the orchestrator
/// itself executes subtasks strictly in list order.
///
/// # Errors
/// Returns an error if the dependency graph contains a cycle.
pub fn dependency_order(subtasks: &[Subtask]) -> Result<Vec<SubtaskId>> {
    let graph = dependency_graph(subtasks);
    let sorted = toposort(&graph, None).map_err(|cycle| {
        Error::Validation(format!(
            "cycle detected at subtask {}",
            graph[cycle.node_id()].short()
        ))
    })?;
    Ok(sorted.into_iter().map(|index| graph[index]).collect())
}

/// Build the dependency digraph: an edge from A to B means B depends on A.
fn dependency_graph(subtasks: &[Subtask]) -> DiGraph<SubtaskId, ()> {
    let mut graph: DiGraph<SubtaskId, ()> = DiGraph::new();
    let mut index: HashMap<SubtaskId, NodeIndex> = HashMap::new();

    for subtask in subtasks {
        let node = graph.add_node(subtask.id);
        index.insert(subtask.id, node);
    }
    for subtask in subtasks {
        if let Some(&to) = index.get(&subtask.id) {
            for dep in &subtask.dependencies {
                if let Some(&from) = index.get(dep) {
                    graph.add_edge(from, to, ());
                }
            }
        }
    }

    graph
}

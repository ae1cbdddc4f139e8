//! Test fixtures for integration tests.
//!
//! Provides scripted worker and reviewer agents, plus builders that wire
//! an orchestrator over in-memory storage and audit sinks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crucible::agent::{Agent, AgentInvocation, AgentOutput, AgentRegistry, Capability};
use crucible::audit::MemoryAudit;
use crucible::orchestrator::TaskOrchestrator;
use crucible::refine::{IterationBudget, RefinementLoop};
use crucible::storage::MemoryStorage;

/// The review line that makes the loop converge.
pub const PERFECT_REVIEW: &str = "OUTPUT IS PERFECT - ALL CONSTRAINTS MET";
/// A review line parsed as one critical issue.
pub const CRITICAL_REVIEW: &str = "There is an error in the output.";
/// A review line parsed as one warning issue.
pub const WARNING_REVIEW: &str = "There is a minor issue with formatting.";

/// Worker agent that returns queued outputs, repeating the last one when
/// the queue runs dry. Records every invocation it receives.
pub struct ScriptedAgent {
    capability: Capability,
    outputs: Mutex<Vec<String>>,
    invocations: Mutex<Vec<AgentInvocation>>,
}

impl ScriptedAgent {
    pub fn new(capability: Capability, outputs: &[&str]) -> Self {
        let mut queue: Vec<String> = outputs.iter().map(|s| s.to_string()).collect();
        queue.reverse();
        Self {
            capability,
            outputs: Mutex::new(queue),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// All invocations received so far, in order.
    pub fn invocations(&self) -> Vec<AgentInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn capability(&self) -> Capability {
        self.capability
    }

    async fn execute(&self, invocation: &AgentInvocation) -> AgentOutput {
        self.invocations.lock().unwrap().push(invocation.clone());
        let mut outputs = self.outputs.lock().unwrap();
        let text = if outputs.len() > 1 {
            outputs.pop().unwrap()
        } else {
            outputs.last().cloned().unwrap_or_default()
        };
        AgentOutput::ok(&invocation.id, text)
    }
}

/// Worker agent that always fails.
pub struct FailingAgent {
    capability: Capability,
}

impl FailingAgent {
    pub fn new(capability: Capability) -> Self {
        Self { capability }
    }
}

#[async_trait]
impl Agent for FailingAgent {
    fn capability(&self) -> Capability {
        self.capability
    }

    async fn execute(&self, invocation: &AgentInvocation) -> AgentOutput {
        AgentOutput::failed(&invocation.id, "agent process failed")
    }
}

/// Reviewer that returns queued review texts, repeating the last one.
pub struct ScriptedReviewer {
    responses: Mutex<Vec<String>>,
}

impl ScriptedReviewer {
    pub fn new(responses: &[&str]) -> Self {
        let mut queue: Vec<String> = responses.iter().map(|s| s.to_string()).collect();
        queue.reverse();
        Self {
            responses: Mutex::new(queue),
        }
    }
}

#[async_trait]
impl Agent for ScriptedReviewer {
    fn capability(&self) -> Capability {
        Capability::Review
    }

    async fn execute(&self, invocation: &AgentInvocation) -> AgentOutput {
        let mut responses = self.responses.lock().unwrap();
        let text = if responses.len() > 1 {
            responses.pop().unwrap()
        } else {
            responses.last().cloned().unwrap_or_default()
        };
        AgentOutput::ok(&invocation.id, text)
    }
}

/// Build a registry holding the given agents.
pub fn registry_with(agents: Vec<Arc<dyn Agent>>) -> Arc<AgentRegistry> {
    let mut registry = AgentRegistry::new();
    for agent in agents {
        registry.register(agent);
    }
    Arc::new(registry)
}

/// A refinement loop over the given agents with an in-memory audit sink.
pub fn refinement_loop(agents: Vec<Arc<dyn Agent>>) -> (RefinementLoop, Arc<MemoryAudit>) {
    let audit = Arc::new(MemoryAudit::new());
    let rl = RefinementLoop::new(registry_with(agents), audit.clone());
    (rl, audit)
}

/// A full orchestrator over in-memory storage and audit.
pub struct TestHarness {
    pub orchestrator: TaskOrchestrator,
    pub storage: Arc<MemoryStorage>,
    pub audit: Arc<MemoryAudit>,
}

pub fn harness(agents: Vec<Arc<dyn Agent>>, budget: IterationBudget) -> TestHarness {
    let storage = Arc::new(MemoryStorage::new());
    let audit = Arc::new(MemoryAudit::new());
    let orchestrator = TaskOrchestrator::new(
        storage.clone(),
        audit.clone(),
        registry_with(agents),
        budget,
    );
    TestHarness {
        orchestrator,
        storage,
        audit,
    }
}

/// Empty context map.
pub fn no_context() -> HashMap<String, serde_json::Value> {
    HashMap::new()
}

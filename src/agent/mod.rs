//! Agent abstraction and implementations.
//!
//! An [`Agent`] turns an [`AgentInvocation`] into an [`AgentOutput`].
//! Execution never returns `Err`: transport failures, timeouts, and
//! non-zero exits are all reported as an output with `success == false`
//! so the refinement loop can fold them into its state machine
//! uniformly.

pub mod headless;
pub mod registry;

pub use headless::HeadlessAgent;
pub use registry::{AgentPoolConfig, AgentRegistry};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::core::Constraint;

/// What kind of work an agent is specialized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Coding,
    Testing,
    Documentation,
    Review,
    General,
}

impl Capability {
    /// All capabilities, in the fixed fallback scan order used when no
    /// specialized agent matches an invocation.
    pub const ALL: [Capability; 5] = [
        Capability::Coding,
        Capability::Testing,
        Capability::Documentation,
        Capability::Review,
        Capability::General,
    ];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::Coding => "coding",
            Capability::Testing => "testing",
            Capability::Documentation => "documentation",
            Capability::Review => "review",
            Capability::General => "general",
        };
        write!(f, "{}", s)
    }
}

/// A single unit of work handed to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInvocation {
    /// Caller-chosen identifier, threaded through logs and audit events.
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    /// Zero-based iteration index within a refinement loop.
    #[serde(default)]
    pub iteration: usize,
    /// Reviewer feedback from the previous iteration, if any.
    #[serde(default)]
    pub feedback: Option<String>,
}

impl AgentInvocation {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            context: HashMap::new(),
            constraints: Vec::new(),
            iteration: 0,
            feedback: None,
        }
    }
}

/// The result of one agent execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub task_id: String,
    pub success: bool,
    pub output: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub error: Option<String>,
}

impl AgentOutput {
    /// A successful output.
    pub fn ok(task_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            output: Some(output.into()),
            metadata: HashMap::new(),
            error: None,
        }
    }

    /// A failed output carrying an error description.
    pub fn failed(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            output: None,
            metadata: HashMap::new(),
            error: Some(error.into()),
        }
    }
}

/// A worker that executes invocations for one capability.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The capability this agent is registered under.
    fn capability(&self) -> Capability;

    /// Whether this agent accepts the given invocation. Defaults to
    /// accepting everything; specialized agents may refuse work.
    fn can_handle(&self, _invocation: &AgentInvocation) -> bool {
        true
    }

    /// Execute the invocation. Infallible at the signature level;
    /// failures are reported through [`AgentOutput::success`].
    async fn execute(&self, invocation: &AgentInvocation) -> AgentOutput;
}

//! Agent pool configuration and capability-based routing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentInvocation, Capability, HeadlessAgent};
use crate::clog;
use crate::core::classify::{Classifier, KeywordClassifier, Tag};
use crate::error::{Error, Result};

/// Explicit pool configuration. The binary layer decides where the API
/// key and agent kinds come from; the library never reads the
/// environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPoolConfig {
    /// API key forwarded to spawned agent processes, if any.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Which capabilities to stand up agents for.
    #[serde(default = "default_agent_kinds")]
    pub agent_kinds: HashSet<Capability>,
}

fn default_agent_kinds() -> HashSet<Capability> {
    Capability::ALL.into_iter().collect()
}

impl Default for AgentPoolConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            agent_kinds: default_agent_kinds(),
        }
    }
}

/// Holds at most one agent per capability and routes invocations to the
/// best match.
pub struct AgentRegistry {
    agents: HashMap<Capability, Arc<dyn Agent>>,
    classifier: Box<dyn Classifier>,
}

impl AgentRegistry {
    /// An empty registry with the default keyword classifier.
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
            classifier: Box::new(KeywordClassifier::new()),
        }
    }

    /// Build a registry of headless agents, one per configured kind.
    ///
    /// # Errors
    /// Returns an error if the agent binary cannot be located.
    pub fn from_config(config: &AgentPoolConfig, command: &str) -> Result<Self> {
        let mut registry = Self::new();
        for &kind in &Capability::ALL {
            if !config.agent_kinds.contains(&kind) {
                continue;
            }
            let mut agent = HeadlessAgent::new(kind, command)?;
            if let Some(key) = &config.api_key {
                agent = agent.with_api_key(key);
            }
            registry.register(Arc::new(agent));
        }
        clog!("Agent registry ready with {} agent(s)", registry.agents.len());
        Ok(registry)
    }

    /// Register an agent, replacing any existing agent for the same
    /// capability.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.capability(), agent);
    }

    /// Replace the classifier used for routing.
    pub fn with_classifier(mut self, classifier: Box<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Look up the agent registered for a capability.
    pub fn get(&self, capability: Capability) -> Option<Arc<dyn Agent>> {
        self.agents.get(&capability).cloned()
    }

    /// Select an agent for an invocation.
    ///
    /// Routing classifies the invocation description and tries the
    /// matching specialized agents in a fixed priority order (testing,
    /// then documentation, then coding), falling back to the general
    /// agent, and finally to any registered agent. The fallbacks are
    /// unconditional, so a non-empty registry always yields an agent;
    /// routing fails only when no agents are registered at all.
    pub fn agent_for(&self, invocation: &AgentInvocation) -> Result<Arc<dyn Agent>> {
        let tags = self.classifier.classify(&invocation.description);

        let preferences = [
            (Tag::Testing, Capability::Testing),
            (Tag::Documentation, Capability::Documentation),
            (Tag::Coding, Capability::Coding),
        ];
        for (tag, capability) in preferences {
            if !tags.contains(&tag) {
                continue;
            }
            if let Some(agent) = self.agents.get(&capability) {
                if agent.can_handle(invocation) {
                    return Ok(agent.clone());
                }
            }
        }

        if let Some(agent) = self.agents.get(&Capability::General) {
            return Ok(agent.clone());
        }

        for capability in Capability::ALL {
            if let Some(agent) = self.agents.get(&capability) {
                return Ok(agent.clone());
            }
        }

        Err(Error::AgentUnavailable(format!(
            "no agents registered for invocation {}",
            invocation.id
        )))
    }

    /// The agent used for semantic review: the review agent if
    /// registered, otherwise the general agent, otherwise none.
    pub fn review_agent(&self) -> Option<Arc<dyn Agent>> {
        self.agents
            .get(&Capability::Review)
            .or_else(|| self.agents.get(&Capability::General))
            .cloned()
    }

    /// Registered capabilities, in the fixed scan order.
    pub fn list(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| self.agents.contains_key(c))
            .collect()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Headless CLI-backed agent.
//!
//! `HeadlessAgent` runs an AI coding assistant binary in non-interactive
//! mode (`-p` flag) with JSON output, builds capability-specific prompts,
//! and parses the structured response. All process-level failures are
//! folded into an unsuccessful [`AgentOutput`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::agent::{Agent, AgentInvocation, AgentOutput, Capability};
use crate::clog_debug;
use crate::error::{Error, Result};

/// Default timeout for agent execution (10 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Internal struct for deserializing the binary's JSON response.
#[derive(Debug, Deserialize)]
struct RawResponse {
    subtype: Option<String>,
    result: Option<String>,
    session_id: Option<String>,
    total_cost_usd: Option<f64>,
    duration_ms: Option<u64>,
    num_turns: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

/// Parsed response from a headless execution.
#[derive(Debug, Clone)]
struct HeadlessResponse {
    session_id: Option<String>,
    output: std::result::Result<String, String>,
    cost_usd: Option<f64>,
    duration_ms: Option<u64>,
    num_turns: Option<u32>,
}

/// An agent that shells out to a headless AI assistant binary.
#[derive(Debug, Clone)]
pub struct HeadlessAgent {
    capability: Capability,
    binary: PathBuf,
    output_format: String,
    timeout: Duration,
    api_key: Option<String>,
}

impl HeadlessAgent {
    /// Create an agent for a capability, locating `command` on PATH.
    ///
    /// # Errors
    /// Returns an error if the binary cannot be found.
    pub fn new(capability: Capability, command: &str) -> Result<Self> {
        let binary = which::which(command)
            .map_err(|_| Error::AgentBinaryNotFound(command.to_string()))?;
        Ok(Self::with_binary(capability, binary))
    }

    /// Create an agent with an explicit binary path.
    pub fn with_binary(capability: Capability, binary: PathBuf) -> Self {
        Self {
            capability,
            binary,
            output_format: "json".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            api_key: None,
        }
    }

    /// Set a custom execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Forward an API key to the spawned process environment.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Assemble the full prompt for an invocation.
    ///
    /// Layout: capability preamble, constraint list, prior-iteration
    /// feedback, then the task body with context and an iteration note.
    fn build_prompt(&self, invocation: &AgentInvocation) -> String {
        let specialty = match self.capability {
            Capability::Coding => {
                "writing high-quality, well-structured code. You follow best practices, \
                 write clean code, and ensure maintainability."
            }
            Capability::Testing => {
                "creating comprehensive test suites. You write thorough unit tests, \
                 integration tests, and ensure high code coverage."
            }
            Capability::Documentation => {
                "creating clear, comprehensive documentation. You write detailed API docs, \
                 README files, and user guides."
            }
            Capability::Review => {
                "reviewing and validating outputs. You check for errors, constraint \
                 violations, and ensure quality standards are met."
            }
            Capability::General => {
                "solving complex problems across various domains. You are versatile and \
                 can handle diverse tasks effectively."
            }
        };

        let mut prompt = format!(
            "You are a highly capable AI assistant specialized in {}",
            specialty
        );

        if !invocation.constraints.is_empty() {
            prompt.push_str(
                "\n\nIMPORTANT: You must strictly adhere to the following constraints:\n",
            );
            for (i, constraint) in invocation.constraints.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, constraint));
            }
        }

        if let Some(feedback) = &invocation.feedback {
            prompt.push_str(&format!("\n\nFEEDBACK FROM PREVIOUS ITERATION:\n{}\n", feedback));
            prompt.push_str(
                "Please address all feedback and ensure all constraints are met in this iteration.",
            );
        }

        prompt.push_str(&format!("\n\nTASK:\n{}\n", invocation.description));

        if !invocation.context.is_empty() {
            prompt.push_str("\n\nCONTEXT:\n");
            let mut keys: Vec<&String> = invocation.context.keys().collect();
            keys.sort();
            for key in keys {
                prompt.push_str(&format!("- {}: {}\n", key, invocation.context[key]));
            }
        }

        if invocation.iteration > 0 {
            prompt.push_str(&format!(
                "\n\nThis is iteration {}. Please refine your previous output based on the feedback provided.",
                invocation.iteration + 1
            ));
        }

        prompt
    }

    async fn run(&self, prompt: &str) -> Result<HeadlessResponse> {
        let mut command = Command::new(&self.binary);
        command
            .arg("-p")
            .arg(prompt)
            .arg("--output-format")
            .arg(&self.output_format);
        if let Some(key) = &self.api_key {
            command.env("ANTHROPIC_API_KEY", key);
        }

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| Error::Timeout(self.timeout))?
            .map_err(Error::Io)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if let Ok(response) = Self::parse_json_response(&stdout) {
            return Ok(response);
        }

        if !output.status.success() {
            let message = if stderr.is_empty() {
                format!(
                    "agent process exited with code {}",
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            return Ok(HeadlessResponse {
                session_id: None,
                output: Err(message),
                cost_usd: None,
                duration_ms: None,
                num_turns: None,
            });
        }

        // Non-JSON success output. Should not happen with JSON format
        // requested, but pass the text through rather than dropping it.
        Ok(HeadlessResponse {
            session_id: None,
            output: Ok(stdout.trim().to_string()),
            cost_usd: None,
            duration_ms: None,
            num_turns: None,
        })
    }

    fn parse_json_response(json_str: &str) -> Result<HeadlessResponse> {
        let raw: RawResponse = serde_json::from_str(json_str)?;

        let output = match raw.subtype.as_deref() {
            Some("success") => Ok(raw.result.unwrap_or_default()),
            Some("error") => Err(raw.error.or(raw.result).unwrap_or_default()),
            _ => {
                if let Some(error) = raw.error {
                    Err(error)
                } else if let Some(result) = raw.result {
                    Ok(result)
                } else {
                    Err("unknown response format".to_string())
                }
            }
        };

        Ok(HeadlessResponse {
            session_id: raw.session_id,
            output,
            cost_usd: raw.total_cost_usd,
            duration_ms: raw.duration_ms,
            num_turns: raw.num_turns,
        })
    }
}

#[async_trait]
impl Agent for HeadlessAgent {
    fn capability(&self) -> Capability {
        self.capability
    }

    async fn execute(&self, invocation: &AgentInvocation) -> AgentOutput {
        let prompt = self.build_prompt(invocation);
        clog_debug!(
            "Executing {} agent for {} (iteration {})",
            self.capability,
            invocation.id,
            invocation.iteration
        );

        let response = match self.run(&prompt).await {
            Ok(response) => response,
            Err(err) => return AgentOutput::failed(&invocation.id, err.to_string()),
        };

        let mut result = match response.output {
            Ok(text) => AgentOutput::ok(&invocation.id, text),
            Err(message) => AgentOutput::failed(&invocation.id, message),
        };

        result.metadata.insert(
            "agent_type".to_string(),
            serde_json::json!(self.capability.to_string()),
        );
        result
            .metadata
            .insert("iteration".to_string(), serde_json::json!(invocation.iteration));
        if let Some(session_id) = response.session_id {
            result
                .metadata
                .insert("session_id".to_string(), serde_json::json!(session_id));
        }
        if let Some(cost) = response.cost_usd {
            result
                .metadata
                .insert("cost_usd".to_string(), serde_json::json!(cost));
        }
        if let Some(duration) = response.duration_ms {
            result
                .metadata
                .insert("duration_ms".to_string(), serde_json::json!(duration));
        }
        if let Some(turns) = response.num_turns {
            result
                .metadata
                .insert("num_turns".to_string(), serde_json::json!(turns));
        }

        result
    }
}

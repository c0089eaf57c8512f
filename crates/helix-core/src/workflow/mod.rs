//! Workflow Definition: the declarative, validated description of which
//! agents run, in what order, and how their artifacts feed one another.

mod parser;
mod toml_format;

pub use parser::{parse_workflow_toml, WorkflowParseError};

/// One agent's position in a workflow: what it consumes, what schema its
/// output must satisfy, and how many times it may be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    pub id: String,
    pub schema_id: String,
    /// Names of artifacts produced by earlier agents that this agent's
    /// task input is assembled from.
    pub input_artifacts: Vec<String>,
    pub max_retries: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureHandling {
    pub default_max_retries: i32,
    pub evolution_attempts_per_job: i32,
}

/// A fully validated, ready-to-execute workflow: a linear sequence of
/// agents where every declared input is guaranteed to be produced by an
/// earlier stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowDefinition {
    pub workflow_version: String,
    pub agents: Vec<AgentSpec>,
    pub execution_order: Vec<String>,
    pub failure_handling: FailureHandling,
}

impl WorkflowDefinition {
    pub fn agent(&self, id: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// The agent that runs after `id`, or `None` if `id` is the last stage.
    pub fn next_agent(&self, id: &str) -> Option<&AgentSpec> {
        let pos = self.execution_order.iter().position(|a| a == id)?;
        self.execution_order
            .get(pos + 1)
            .and_then(|next_id| self.agent(next_id))
    }

    pub fn first_agent(&self) -> &AgentSpec {
        self.agent(&self.execution_order[0])
            .expect("execution_order and agents are validated to agree")
    }

    pub fn is_last(&self, id: &str) -> bool {
        self.execution_order.last().map(String::as_str) == Some(id)
    }
}

//! On-disk TOML shape of a workflow definition, independent of how it is
//! validated or turned into an executable sequence.

use serde::{Deserialize, Serialize};

fn default_max_retries() -> i32 {
    3
}

fn default_version() -> String {
    "1".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowToml {
    #[serde(default = "default_version")]
    pub workflow_version: String,
    pub agents: Vec<AgentToml>,
    pub execution_order: Vec<String>,
    #[serde(default)]
    pub failure_handling: FailureHandlingToml,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentToml {
    pub id: String,
    pub schema_id: String,
    #[serde(default)]
    pub input_artifacts: Vec<String>,
    pub max_retries: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureHandlingToml {
    #[serde(default = "default_max_retries")]
    pub default_max_retries: i32,
    /// Maximum number of times the evolution coordinator may install a new
    /// prompt version for this workflow's job before giving up and leaving
    /// the job failed.
    #[serde(default = "default_evolution_attempts")]
    pub evolution_attempts_per_job: i32,
}

fn default_evolution_attempts() -> i32 {
    1
}

impl Default for FailureHandlingToml {
    fn default() -> Self {
        Self {
            default_max_retries: default_max_retries(),
            evolution_attempts_per_job: default_evolution_attempts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let raw = r#"
            workflow_version = "1"
            execution_order = ["drafter", "editor"]

            [[agents]]
            id = "drafter"
            schema_id = "draft.v1"

            [[agents]]
            id = "editor"
            schema_id = "edit.v1"
            input_artifacts = ["draft"]
        "#;
        let parsed: WorkflowToml = toml::from_str(raw).unwrap();
        assert_eq!(parsed.agents.len(), 2);
        assert_eq!(parsed.execution_order, vec!["drafter", "editor"]);
        assert_eq!(parsed.failure_handling.default_max_retries, 3);
    }

    #[test]
    fn failure_handling_overrides_are_honored() {
        let raw = r#"
            execution_order = ["drafter"]

            [[agents]]
            id = "drafter"
            schema_id = "draft.v1"

            [failure_handling]
            default_max_retries = 5
            evolution_attempts_per_job = 2
        "#;
        let parsed: WorkflowToml = toml::from_str(raw).unwrap();
        assert_eq!(parsed.failure_handling.default_max_retries, 5);
        assert_eq!(parsed.failure_handling.evolution_attempts_per_job, 2);
    }
}

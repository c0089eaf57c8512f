//! Validates a parsed [`WorkflowToml`] and turns it into an executable
//! [`WorkflowDefinition`].

use std::collections::HashSet;

use thiserror::Error;

use super::toml_format::WorkflowToml;
use super::{AgentSpec, FailureHandling, WorkflowDefinition};

#[derive(Debug, Error)]
pub enum WorkflowParseError {
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("execution_order must name at least one agent")]
    EmptyExecutionOrder,
    #[error("duplicate agent id: {0}")]
    DuplicateAgentId(String),
    #[error("execution_order references unknown agent: {0}")]
    UnknownAgentInOrder(String),
    #[error("execution_order does not name every declared agent: missing {0}")]
    AgentMissingFromOrder(String),
    #[error(
        "agent {agent} declares input_artifacts {artifact:?}, which is not produced by any \
         agent earlier in execution_order"
    )]
    ForwardOrUnknownInput { agent: String, artifact: String },
}

pub fn parse_workflow_toml(raw: &str) -> Result<WorkflowDefinition, WorkflowParseError> {
    let doc: WorkflowToml = toml::from_str(raw)?;
    validate(doc)
}

fn validate(doc: WorkflowToml) -> Result<WorkflowDefinition, WorkflowParseError> {
    if doc.execution_order.is_empty() {
        return Err(WorkflowParseError::EmptyExecutionOrder);
    }

    let mut seen_ids = HashSet::new();
    for agent in &doc.agents {
        if !seen_ids.insert(agent.id.clone()) {
            return Err(WorkflowParseError::DuplicateAgentId(agent.id.clone()));
        }
    }

    for id in &doc.execution_order {
        if !seen_ids.contains(id) {
            return Err(WorkflowParseError::UnknownAgentInOrder(id.clone()));
        }
    }
    for id in &seen_ids {
        if !doc.execution_order.contains(id) {
            return Err(WorkflowParseError::AgentMissingFromOrder(id.clone()));
        }
    }

    // Walk execution_order in sequence, tracking which artifact names are
    // available so every agent's inputs are provably produced upstream.
    let mut available: HashSet<String> = HashSet::new();
    let agents_by_id: std::collections::HashMap<_, _> =
        doc.agents.iter().map(|a| (a.id.clone(), a)).collect();

    for agent_id in &doc.execution_order {
        let agent = agents_by_id[agent_id];
        for input in &agent.input_artifacts {
            if !available.contains(input) {
                return Err(WorkflowParseError::ForwardOrUnknownInput {
                    agent: agent_id.clone(),
                    artifact: input.clone(),
                });
            }
        }
        // An agent's own id is also the default name of the artifact it
        // produces, available to every agent after it in the sequence.
        available.insert(agent_id.clone());
    }

    let agents = doc
        .execution_order
        .iter()
        .map(|id| {
            let a = agents_by_id[id];
            AgentSpec {
                id: a.id.clone(),
                schema_id: a.schema_id.clone(),
                input_artifacts: a.input_artifacts.clone(),
                max_retries: a.max_retries.unwrap_or(doc.failure_handling.default_max_retries),
            }
        })
        .collect();

    Ok(WorkflowDefinition {
        workflow_version: doc.workflow_version,
        agents,
        execution_order: doc.execution_order,
        failure_handling: FailureHandling {
            default_max_retries: doc.failure_handling.default_max_retries,
            evolution_attempts_per_job: doc.failure_handling.evolution_attempts_per_job,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_two_stage() -> &'static str {
        r#"
            execution_order = ["drafter", "editor"]

            [[agents]]
            id = "drafter"
            schema_id = "draft.v1"

            [[agents]]
            id = "editor"
            schema_id = "edit.v1"
            input_artifacts = ["drafter"]
        "#
    }

    #[test]
    fn valid_workflow_parses() {
        let wf = parse_workflow_toml(valid_two_stage()).unwrap();
        assert_eq!(wf.agents.len(), 2);
        assert_eq!(wf.agents[1].input_artifacts, vec!["drafter"]);
    }

    #[test]
    fn rejects_empty_execution_order() {
        let raw = r#"
            execution_order = []
        "#;
        let err = parse_workflow_toml(raw).unwrap_err();
        assert!(matches!(err, WorkflowParseError::EmptyExecutionOrder));
    }

    #[test]
    fn rejects_duplicate_agent_ids() {
        let raw = r#"
            execution_order = ["drafter"]

            [[agents]]
            id = "drafter"
            schema_id = "draft.v1"

            [[agents]]
            id = "drafter"
            schema_id = "draft.v2"
        "#;
        let err = parse_workflow_toml(raw).unwrap_err();
        assert!(matches!(err, WorkflowParseError::DuplicateAgentId(_)));
    }

    #[test]
    fn rejects_unknown_agent_in_order() {
        let raw = r#"
            execution_order = ["ghost"]

            [[agents]]
            id = "drafter"
            schema_id = "draft.v1"
        "#;
        let err = parse_workflow_toml(raw).unwrap_err();
        assert!(matches!(err, WorkflowParseError::UnknownAgentInOrder(_)));
    }

    #[test]
    fn rejects_agent_missing_from_order() {
        let raw = r#"
            execution_order = ["drafter"]

            [[agents]]
            id = "drafter"
            schema_id = "draft.v1"

            [[agents]]
            id = "editor"
            schema_id = "edit.v1"
        "#;
        let err = parse_workflow_toml(raw).unwrap_err();
        assert!(matches!(err, WorkflowParseError::AgentMissingFromOrder(_)));
    }

    #[test]
    fn rejects_forward_reference_to_a_later_agent() {
        let raw = r#"
            execution_order = ["editor", "drafter"]

            [[agents]]
            id = "drafter"
            schema_id = "draft.v1"

            [[agents]]
            id = "editor"
            schema_id = "edit.v1"
            input_artifacts = ["drafter"]
        "#;
        let err = parse_workflow_toml(raw).unwrap_err();
        assert!(matches!(
            err,
            WorkflowParseError::ForwardOrUnknownInput { .. }
        ));
    }

    #[test]
    fn per_agent_retry_override_wins_over_default() {
        let raw = r#"
            execution_order = ["drafter"]

            [[agents]]
            id = "drafter"
            schema_id = "draft.v1"
            max_retries = 7

            [failure_handling]
            default_max_retries = 3
        "#;
        let wf = parse_workflow_toml(raw).unwrap();
        assert_eq!(wf.agents[0].max_retries, 7);
    }
}

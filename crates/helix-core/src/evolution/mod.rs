//! Evolution Coordinator: when a task exhausts its retries, gives its
//! agent's prompt one chance to be rewritten before the job is left
//! permanently failed.

use async_trait::async_trait;
use helix_db::models::Task;
use helix_db::queries::{events, tasks};
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::prompt::PromptStore;
use crate::workflow::WorkflowDefinition;

/// The failure an evolver is asked to respond to.
#[derive(Debug, Clone)]
pub struct EvolutionContext {
    pub agent_id: String,
    pub schema_id: String,
    pub error_log: String,
}

#[derive(Debug, Error)]
pub enum EvolutionError {
    #[error("prompt evolution failed: {0}")]
    Failed(String),
}

/// Rewrites a prompt in response to a failure. This crate never ships a
/// concrete implementation -- generating a better prompt requires calling
/// out to a model, which is the same out-of-scope seam as
/// [`crate::executor::AgentExecutor`].
#[async_trait]
pub trait PromptEvolver: Send + Sync {
    async fn evolve(&self, current_prompt: &str, context: &EvolutionContext) -> Result<String, EvolutionError>;
}

/// Why an evolution attempt did or did not happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvolutionOutcome {
    /// A new prompt version was installed and the task was requeued.
    Evolved { new_version: String },
    /// The workflow's `evolution_attempts_per_job` cap was already spent.
    CapReached,
}

pub struct EvolutionCoordinator<'a> {
    pool: &'a PgPool,
    evolver: &'a dyn PromptEvolver,
}

impl<'a> EvolutionCoordinator<'a> {
    pub fn new(pool: &'a PgPool, evolver: &'a dyn PromptEvolver) -> Self {
        Self { pool, evolver }
    }

    /// Respond to a terminally failed task. Counts prior `prompt.installed`
    /// events for this agent within this job rather than a dedicated
    /// counter column, so the cap survives a restart without a schema
    /// migration. Scoped per `(job_id, agent_id)`: a multi-agent workflow
    /// gives every agent its own evolution budget instead of them sharing
    /// one job-wide pool.
    pub async fn handle_terminal_failure(
        &self,
        task: &Task,
        workflow: &WorkflowDefinition,
    ) -> anyhow::Result<EvolutionOutcome> {
        let attempts_used = events::count_events_of_type_for_agent(
            self.pool,
            task.job_id,
            "prompt.installed",
            &task.agent_id,
        )
        .await?;
        if attempts_used >= workflow.failure_handling.evolution_attempts_per_job as i64 {
            return Ok(EvolutionOutcome::CapReached);
        }

        let agent = workflow
            .agent(&task.agent_id)
            .ok_or_else(|| anyhow::anyhow!("unknown agent {}", task.agent_id))?;

        let prompt_store = PromptStore::new(self.pool);
        let active = prompt_store
            .active(&agent.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no active prompt for agent {}", agent.id))?;

        let context = EvolutionContext {
            agent_id: agent.id.clone(),
            schema_id: agent.schema_id.clone(),
            error_log: task.error_log.clone().unwrap_or_default(),
        };

        let new_text = self
            .evolver
            .evolve(&active.prompt_text, &context)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        let next_version = format!("{}-eauto{}", active.version, attempts_used + 1);
        prompt_store
            .install(&agent.id, &next_version, &new_text, "evolution-coordinator")
            .await?;

        events::record_event(
            self.pool,
            Some(task.job_id),
            None,
            "prompt.installed",
            json!({"agent_id": agent.id, "version": next_version, "trigger": "terminal_failure"}),
        )
        .await?;

        let requeued = tasks::requeue_after_evolution(self.pool, task.id).await?;
        anyhow::ensure!(requeued, "task {} was not in a failed state to requeue", task.id);

        info!(agent_id = %agent.id, version = %next_version, "evolved prompt and requeued task");

        Ok(EvolutionOutcome::Evolved {
            new_version: next_version,
        })
    }
}

use anyhow::Context;
use async_trait::async_trait;
use helix_core::evolution::{EvolutionContext, EvolutionCoordinator, EvolutionError, EvolutionOutcome, PromptEvolver};
use helix_core::workflow::parse_workflow_toml;
use helix_db::queries::tasks;
use sqlx::PgPool;
use uuid::Uuid;

/// Appends the failure's error log to the prompt as a corrective note.
///
/// This is the only evolver this binary ships: rewriting a prompt well
/// enough to actually fix an agent's behavior requires calling out to a
/// model, which is outside what this crate does on its own. Operators who
/// want real evolution wire in their own [`PromptEvolver`] and call
/// [`EvolutionCoordinator`] directly instead of going through this CLI.
struct AppendFailureNoteEvolver;

#[async_trait]
impl PromptEvolver for AppendFailureNoteEvolver {
    async fn evolve(&self, current_prompt: &str, context: &EvolutionContext) -> Result<String, EvolutionError> {
        Ok(format!(
            "{current_prompt}\n\nThe previous attempt failed validation against {}: {}. \
             Make sure the output satisfies every required field.",
            context.schema_id, context.error_log
        ))
    }
}

pub async fn run(pool: &PgPool, task_id: &str, workflow_path: &str) -> anyhow::Result<()> {
    let id: Uuid = task_id.parse().context("parsing task id")?;
    let task = tasks::get_task(pool, id)
        .await?
        .with_context(|| format!("no task {task_id}"))?;

    let raw = std::fs::read_to_string(workflow_path).context("reading workflow file")?;
    let workflow = parse_workflow_toml(&raw).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let evolver = AppendFailureNoteEvolver;
    let coordinator = EvolutionCoordinator::new(pool, &evolver);
    match coordinator.handle_terminal_failure(&task, &workflow).await? {
        EvolutionOutcome::Evolved { new_version } => {
            println!("installed {new_version} and requeued task {task_id}");
        }
        EvolutionOutcome::CapReached => {
            println!("evolution budget for this job is already spent; task left failed");
        }
    }
    Ok(())
}

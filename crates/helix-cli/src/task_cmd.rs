use anyhow::Context;
use clap::Subcommand;
use helix_db::queries::tasks;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Show a single task
    Get { task_id: String },
    /// List every task in a job
    List { job_id: String },
}

pub async fn run(pool: &PgPool, command: TaskCommands) -> anyhow::Result<()> {
    match command {
        TaskCommands::Get { task_id } => {
            let id: Uuid = task_id.parse().context("parsing task id")?;
            match tasks::get_task(pool, id).await? {
                Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
                None => anyhow::bail!("no task {task_id}"),
            }
        }
        TaskCommands::List { job_id } => {
            let id: Uuid = job_id.parse().context("parsing job id")?;
            for task in tasks::list_tasks_for_job(pool, id).await? {
                println!(
                    "{}\t{}\t{}\tattempt={}",
                    task.id, task.agent_id, task.status, task.retry_count
                );
            }
        }
    }
    Ok(())
}

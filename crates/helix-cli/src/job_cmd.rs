use anyhow::Context;
use clap::Subcommand;
use helix_db::models::JobStatus;
use helix_db::queries::jobs;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Subcommand)]
pub enum JobCommands {
    /// Submit a new job with a raw JSON request payload
    Submit {
        /// JSON request body, e.g. '{"topic": "rust ownership"}'
        request_json: String,
    },
    /// Show a single job
    Get { job_id: String },
    /// List jobs, optionally filtered by status
    List {
        #[arg(long)]
        status: Option<String>,
    },
    /// Cancel a pending or in-progress job
    Cancel { job_id: String },
}

pub async fn run(pool: &PgPool, command: JobCommands) -> anyhow::Result<()> {
    match command {
        JobCommands::Submit { request_json } => {
            let request: serde_json::Value =
                serde_json::from_str(&request_json).context("parsing request JSON")?;
            let job = jobs::insert_job(pool, request).await?;
            println!("{}", job.id);
        }
        JobCommands::Get { job_id } => {
            let id: Uuid = job_id.parse().context("parsing job id")?;
            match jobs::get_job(pool, id).await? {
                Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
                None => anyhow::bail!("no job {job_id}"),
            }
        }
        JobCommands::List { status } => {
            let status = status
                .map(|s| s.parse::<JobStatus>())
                .transpose()
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            for job in jobs::list_jobs(pool, status).await? {
                println!("{}\t{}\t{}", job.id, job.status, job.created_at);
            }
        }
        JobCommands::Cancel { job_id } => {
            let id: Uuid = job_id.parse().context("parsing job id")?;
            if !jobs::cancel_job(pool, id).await? {
                anyhow::bail!("job {job_id} is not pending or in progress");
            }
        }
    }
    Ok(())
}

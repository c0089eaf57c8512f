mod evolve_cmd;
mod janitor_cmd;
mod job_cmd;
mod prompt_cmd;
mod serve_cmd;
mod task_cmd;

use anyhow::Context;
use clap::{Parser, Subcommand};

use helix_db::config::DbConfig;
use helix_db::pool;

#[derive(Parser)]
#[command(name = "helix", about = "Durable orchestration core for multi-agent pipelines")]
struct Cli {
    /// Database URL (overrides HELIX_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply all migrations
    DbInit,
    /// Job management
    Job {
        #[command(subcommand)]
        command: job_cmd::JobCommands,
    },
    /// Task inspection
    Task {
        #[command(subcommand)]
        command: task_cmd::TaskCommands,
    },
    /// Prompt version management
    Prompt {
        #[command(subcommand)]
        command: prompt_cmd::PromptCommands,
    },
    /// Run a single zombie-reclamation sweep and exit
    Janitor {
        /// Seconds of heartbeat silence before a task is considered dead
        #[arg(long, default_value_t = 60)]
        heartbeat_timeout_secs: u64,
        #[arg(long, default_value_t = 3)]
        max_retries: i32,
    },
    /// Manually trigger prompt evolution for a terminally failed task
    Evolve {
        /// Failed task to evolve
        task_id: String,
        /// Workflow definition TOML file
        #[arg(long)]
        workflow: String,
    },
    /// Run the janitor loop (no agent executors are wired up by this binary)
    Serve {
        #[arg(long, default_value_t = 15)]
        janitor_sweep_secs: u64,
        #[arg(long, default_value_t = 60)]
        heartbeat_timeout_secs: u64,
        #[arg(long, default_value_t = 3)]
        max_retries: i32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db_config = match cli.database_url {
        Some(url) => DbConfig::new(url),
        None => DbConfig::from_env(),
    };

    if matches!(cli.command, Commands::DbInit) {
        pool::ensure_database_exists(&db_config)
            .await
            .context("creating database")?;
        let p = pool::create_pool(&db_config).await?;
        pool::run_migrations(&p, &pool::default_migrations_path()).await?;
        println!("database ready at {}", db_config.database_url);
        return Ok(());
    }

    let pool = pool::create_pool(&db_config)
        .await
        .context("connecting to database")?;

    match cli.command {
        Commands::DbInit => unreachable!("handled above"),
        Commands::Job { command } => job_cmd::run(&pool, command).await,
        Commands::Task { command } => task_cmd::run(&pool, command).await,
        Commands::Prompt { command } => prompt_cmd::run(&pool, command).await,
        Commands::Janitor {
            heartbeat_timeout_secs,
            max_retries,
        } => janitor_cmd::run(&pool, heartbeat_timeout_secs, max_retries).await,
        Commands::Evolve { task_id, workflow } => evolve_cmd::run(&pool, &task_id, &workflow).await,
        Commands::Serve {
            janitor_sweep_secs,
            heartbeat_timeout_secs,
            max_retries,
        } => serve_cmd::run(&pool, janitor_sweep_secs, heartbeat_timeout_secs, max_retries).await,
    }
}

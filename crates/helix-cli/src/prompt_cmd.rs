use clap::Subcommand;
use helix_core::prompt::PromptStore;
use sqlx::PgPool;

#[derive(Subcommand)]
pub enum PromptCommands {
    /// Install a new prompt version as the active one for an agent
    Install {
        agent_id: String,
        version: String,
        /// Path to a file containing the prompt text
        #[arg(long)]
        file: String,
        #[arg(long, default_value = "operator")]
        by: String,
    },
    /// Re-activate a previously installed version
    Rollback { agent_id: String, version: String },
    /// List every version installed for an agent, most recent first
    List { agent_id: String },
}

pub async fn run(pool: &PgPool, command: PromptCommands) -> anyhow::Result<()> {
    let store = PromptStore::new(pool);
    match command {
        PromptCommands::Install {
            agent_id,
            version,
            file,
            by,
        } => {
            let text = std::fs::read_to_string(&file)?;
            let prompt = store.install(&agent_id, &version, &text, &by).await?;
            println!("installed {} v{}", prompt.agent_id, prompt.version);
        }
        PromptCommands::Rollback { agent_id, version } => {
            let prompt = store.rollback(&agent_id, &version).await?;
            println!("{} is now active at v{}", prompt.agent_id, prompt.version);
        }
        PromptCommands::List { agent_id } => {
            for prompt in store.versions(&agent_id).await? {
                let marker = if prompt.is_active { "*" } else { " " };
                println!("{marker} {}\t{}\t{}", prompt.version, prompt.created_by, prompt.created_at);
            }
        }
    }
    Ok(())
}

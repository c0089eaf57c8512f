use std::time::Duration;

use helix_core::janitor::{Janitor, JanitorConfig};
use sqlx::PgPool;

pub async fn run(pool: &PgPool, heartbeat_timeout_secs: u64, max_retries: i32) -> anyhow::Result<()> {
    let janitor = Janitor::new(pool);
    let cfg = JanitorConfig {
        heartbeat_timeout: Duration::from_secs(heartbeat_timeout_secs),
        max_retries,
        ..JanitorConfig::default()
    };
    let reclaimed = janitor.sweep_once(&cfg).await?;
    println!("reclaimed {} zombie task(s)", reclaimed.len());
    for task in reclaimed {
        println!("  {} ({})", task.id, task.agent_id);
    }
    Ok(())
}

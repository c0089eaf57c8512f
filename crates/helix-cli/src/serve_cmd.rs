use std::time::Duration;

use helix_core::janitor::{Janitor, JanitorConfig};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runs the janitor loop until interrupted.
///
/// This binary does not ship a concrete [`helix_core::executor::AgentExecutor`],
/// so it cannot itself claim and execute tasks end to end -- that requires
/// an embedding application to construct an [`helix_core::orchestrator::Orchestrator`]
/// with its own executors and call `run_job_to_completion`. What this
/// process can safely do unattended is reclaim zombie tasks so that an
/// embedding application's workers are never permanently blocked behind a
/// dead one.
pub async fn run(
    pool: &PgPool,
    janitor_sweep_secs: u64,
    heartbeat_timeout_secs: u64,
    max_retries: i32,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received interrupt, shutting down");
        cancel_for_signal.cancel();
    });

    let janitor = Janitor::new(pool);
    let cfg = JanitorConfig {
        heartbeat_timeout: Duration::from_secs(heartbeat_timeout_secs),
        max_retries,
        sweep_interval: Duration::from_secs(janitor_sweep_secs),
        ..JanitorConfig::default()
    };
    janitor.run(cfg, cancel).await;
    Ok(())
}

//! Janitor: periodically reclaims tasks abandoned by a dead or hung
//! worker so the orchestrator never waits forever on a zombie.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use helix_db::models::Task;
use helix_db::queries::{events, prompts, tasks};
use serde_json::json;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct JanitorConfig {
    /// A task with no heartbeat inside this window is considered dead.
    pub heartbeat_timeout: Duration,
    /// Retry ceiling applied to tasks reclaimed from a dead worker;
    /// ordinarily the workflow's per-agent `max_retries`, but the janitor
    /// does not have workflow context, so callers pass it explicitly.
    pub max_retries: i32,
    pub sweep_interval: Duration,
    /// How many inactive, non-baseline prompt versions to keep per agent;
    /// older ones are purged. The active version and `v0` are always kept
    /// regardless of this count.
    pub prompt_retention_versions: i64,
    /// System events older than this are purged.
    pub event_retention: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(60),
            max_retries: 3,
            sweep_interval: Duration::from_secs(15),
            prompt_retention_versions: 5,
            event_retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

pub struct Janitor<'a> {
    pool: &'a PgPool,
}

impl<'a> Janitor<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Reclaim every task whose heartbeat has gone stale, logging a
    /// `task.zombie_recovered` event per task; then purge prompt versions
    /// and system events past their retention windows. A zombie-reclaim
    /// failure does not stop the retention sweeps, and vice versa -- each
    /// runs and is logged independently.
    pub async fn sweep_once(&self, cfg: &JanitorConfig) -> Result<Vec<Task>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(cfg.heartbeat_timeout)
                .context("heartbeat_timeout out of range")?;

        let reclaimed = tasks::reset_zombie_tasks(self.pool, cutoff, cfg.max_retries)
            .await
            .context("sweeping zombie tasks")?;

        for task in &reclaimed {
            warn!(task_id = %task.id, agent_id = %task.agent_id, "reclaimed zombie task");
            events::record_event(
                self.pool,
                Some(task.job_id),
                Some(task.id),
                "task.zombie_recovered",
                json!({"agent_id": task.agent_id, "last_worker_id": task.worker_id}),
            )
            .await
            .context("recording zombie recovery event")?;
        }

        let purged_versions = prompts::purge_old_versions(self.pool, cfg.prompt_retention_versions)
            .await
            .context("purging old prompt versions")?;
        if purged_versions > 0 {
            info!(count = purged_versions, "purged retired prompt versions");
        }

        let event_cutoff = Utc::now()
            - chrono::Duration::from_std(cfg.event_retention).context("event_retention out of range")?;
        let purged_events = events::purge_events_older_than(self.pool, event_cutoff)
            .await
            .context("purging old system events")?;
        if purged_events > 0 {
            info!(count = purged_events, "purged expired system events");
        }

        Ok(reclaimed)
    }

    /// Sweep forever on `sweep_interval` until `cancel` fires.
    pub async fn run(&self, cfg: JanitorConfig, cancel: CancellationToken) {
        info!(
            heartbeat_timeout_secs = cfg.heartbeat_timeout.as_secs(),
            "janitor started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("janitor shutting down");
                    return;
                }
                _ = tokio::time::sleep(cfg.sweep_interval) => {
                    if let Err(err) = self.sweep_once(&cfg).await {
                        warn!(error = %err, "janitor sweep failed");
                    }
                }
            }
        }
    }
}

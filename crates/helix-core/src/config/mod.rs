//! Runtime configuration for the orchestration core: everything that is
//! not itself part of the durable state, layered from environment
//! variables over built-in defaults.

use std::env;
use std::time::Duration;

use helix_db::config::DbConfig;

use crate::orchestrator::OrchestratorConfig;

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Top-level configuration for a `helix` process, whether it is running
/// `serve`, a one-shot CLI command, or an integration test harness.
#[derive(Debug, Clone)]
pub struct HelixConfig {
    pub db: DbConfig,
    pub max_agents: usize,
    pub heartbeat_timeout: Duration,
    pub janitor_sweep_interval: Duration,
    pub zombie_max_retries: i32,
    /// How often a worker heartbeats a task it is actively executing.
    pub worker_heartbeat_interval: Duration,
    /// How long a single task execution may run before it is aborted.
    pub task_timeout: Duration,
    /// Inactive, non-baseline prompt versions kept per agent by the janitor.
    pub prompt_retention_versions: i64,
    /// How long system events are kept before the janitor purges them.
    pub event_retention: Duration,
}

impl HelixConfig {
    /// Build from the environment. `HELIX_DATABASE_URL` is read by
    /// [`DbConfig::from_env`]; the orchestration knobs below read their
    /// own `HELIX_*` variables, falling back to sane defaults so a
    /// developer can run `helix serve` with zero configuration against a
    /// local database.
    pub fn from_env() -> Self {
        Self {
            db: DbConfig::from_env(),
            max_agents: env_usize("HELIX_MAX_AGENTS", 4),
            heartbeat_timeout: Duration::from_secs(env_u64("HELIX_HEARTBEAT_TIMEOUT_SECS", 60)),
            janitor_sweep_interval: Duration::from_secs(env_u64("HELIX_JANITOR_SWEEP_SECS", 15)),
            zombie_max_retries: env_i32("HELIX_ZOMBIE_MAX_RETRIES", 3),
            worker_heartbeat_interval: Duration::from_secs(env_u64("HELIX_WORKER_HEARTBEAT_SECS", 20)),
            task_timeout: Duration::from_secs(env_u64("HELIX_TASK_TIMEOUT_SECS", 300)),
            prompt_retention_versions: env_i64("HELIX_PROMPT_RETENTION_VERSIONS", 5),
            event_retention: Duration::from_secs(env_u64("HELIX_EVENT_RETENTION_DAYS", 30) * 24 * 60 * 60),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrent_tasks: self.max_agents,
            heartbeat_interval: self.worker_heartbeat_interval,
            task_timeout: self.task_timeout,
            ..OrchestratorConfig::default()
        }
    }

    pub fn janitor_config(&self) -> crate::janitor::JanitorConfig {
        crate::janitor::JanitorConfig {
            heartbeat_timeout: self.heartbeat_timeout,
            max_retries: self.zombie_max_retries,
            sweep_interval: self.janitor_sweep_interval,
            prompt_retention_versions: self.prompt_retention_versions,
            event_retention: self.event_retention,
        }
    }
}

impl Default for HelixConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_with_no_environment() {
        // SAFETY: no other test in this process mutates these variables concurrently.
        unsafe {
            env::remove_var("HELIX_MAX_AGENTS");
            env::remove_var("HELIX_HEARTBEAT_TIMEOUT_SECS");
        }
        let cfg = HelixConfig::from_env();
        assert_eq!(cfg.max_agents, 4);
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(60));
    }
}

//! Task Claimer: the concurrency-safe handoff of a single pending task to
//! exactly one worker.

use std::time::Duration;

use anyhow::Result;
use helix_db::models::Task;
use helix_db::queries::tasks;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

/// How a worker without immediate work should wait before checking again.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
        }
    }
}

pub struct TaskClaimer<'a> {
    pool: &'a PgPool,
}

impl<'a> TaskClaimer<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Attempt to claim one pending task for `agent_id`. Returns `None`
    /// immediately if the queue is empty; never blocks.
    ///
    /// Delegates to [`tasks::claim_task`], which locks its candidate row
    /// with `FOR UPDATE SKIP LOCKED` so concurrent claimers for the same
    /// agent never contend on, or double-assign, the same task.
    pub async fn try_claim(&self, agent_id: &str, worker_id: &str) -> Result<Option<Task>> {
        tasks::claim_task(self.pool, agent_id, worker_id).await
    }

    /// Poll until a task is claimed or `cancel` fires, whichever comes
    /// first. Returns `None` only when cancelled.
    pub async fn claim_blocking(
        &self,
        agent_id: &str,
        worker_id: &str,
        policy: PollPolicy,
        cancel: &CancellationToken,
    ) -> Result<Option<Task>> {
        loop {
            if let Some(task) = self.try_claim(agent_id, worker_id).await? {
                return Ok(Some(task));
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_db::queries::{jobs, tasks as task_queries};
    use helix_test_utils::{create_test_db, drop_test_db};
    use serde_json::json;

    #[tokio::test]
    async fn try_claim_returns_none_on_empty_queue() {
        let (pool, db_name) = create_test_db().await;
        let claimer = TaskClaimer::new(&pool);
        assert!(claimer.try_claim("drafter", "worker-a").await.unwrap().is_none());
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn claim_blocking_returns_as_soon_as_work_appears() {
        let (pool, db_name) = create_test_db().await;
        let job = jobs::insert_job(&pool, json!({})).await.unwrap();
        task_queries::insert_task(&pool, job.id, "drafter", json!({}))
            .await
            .unwrap();

        let claimer = TaskClaimer::new(&pool);
        let cancel = CancellationToken::new();
        let claimed = claimer
            .claim_blocking("drafter", "worker-a", PollPolicy::default(), &cancel)
            .await
            .unwrap();
        assert!(claimed.is_some());

        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn claim_blocking_returns_none_when_cancelled() {
        let (pool, db_name) = create_test_db().await;
        let claimer = TaskClaimer::new(&pool);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let claimed = claimer
            .claim_blocking("drafter", "worker-a", PollPolicy::default(), &cancel)
            .await
            .unwrap();
        assert!(claimed.is_none());
        drop_test_db(&db_name).await;
    }
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ErrorKind, Task, TaskStatus};

/// Insert a new task in [`TaskStatus::Pending`], unclaimed.
pub async fn insert_task(
    pool: &PgPool,
    job_id: Uuid,
    agent_id: &str,
    input_data: serde_json::Value,
) -> Result<Task> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query_as::<_, Task>(
        r#"
        INSERT INTO tasks (id, job_id, agent_id, status, input_data, retry_count, created_at)
        VALUES ($1, $2, $3, $4, $5, 0, $6)
        RETURNING id, job_id, agent_id, status, input_data, output_data, error_log, error_kind,
                  retry_count, worker_id, created_at, assigned_at, started_at, completed_at,
                  heartbeat_at
        "#,
    )
    .bind(id)
    .bind(job_id)
    .bind(agent_id)
    .bind(TaskStatus::Pending)
    .bind(input_data)
    .bind(now)
    .fetch_one(pool)
    .await
    .context("inserting task")
}

pub async fn get_task(pool: &PgPool, id: Uuid) -> Result<Option<Task>> {
    sqlx::query_as::<_, Task>(
        r#"
        SELECT id, job_id, agent_id, status, input_data, output_data, error_log, error_kind,
               retry_count, worker_id, created_at, assigned_at, started_at, completed_at,
               heartbeat_at
        FROM tasks WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("fetching task")
}

pub async fn list_tasks_for_job(pool: &PgPool, job_id: Uuid) -> Result<Vec<Task>> {
    sqlx::query_as::<_, Task>(
        r#"
        SELECT id, job_id, agent_id, status, input_data, output_data, error_log, error_kind,
               retry_count, worker_id, created_at, assigned_at, started_at, completed_at,
               heartbeat_at
        FROM tasks WHERE job_id = $1 ORDER BY created_at ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
    .context("listing tasks for job")
}

/// Claim the oldest pending task for `agent_id`, or `None` if no task is
/// waiting.
///
/// Uses `SELECT ... FOR UPDATE SKIP LOCKED` so that concurrent workers
/// racing the same agent queue never block on or double-claim the same
/// row: a locked row is simply invisible to the competing claimer, which
/// moves on to the next candidate.
pub async fn claim_task(pool: &PgPool, agent_id: &str, worker_id: &str) -> Result<Option<Task>> {
    let mut tx = pool.begin().await.context("starting claim transaction")?;

    let candidate: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT id FROM tasks
        WHERE agent_id = $1 AND status = $2
        ORDER BY created_at ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(agent_id)
    .bind(TaskStatus::Pending)
    .fetch_optional(&mut *tx)
    .await
    .context("selecting claimable task")?;

    let Some(task_id) = candidate else {
        tx.commit().await.ok();
        return Ok(None);
    };

    let now = Utc::now();
    let task = sqlx::query_as::<_, Task>(
        r#"
        UPDATE tasks
        SET status = $2, worker_id = $3, assigned_at = $4, started_at = $4, heartbeat_at = $4
        WHERE id = $1
        RETURNING id, job_id, agent_id, status, input_data, output_data, error_log, error_kind,
                  retry_count, worker_id, created_at, assigned_at, started_at, completed_at,
                  heartbeat_at
        "#,
    )
    .bind(task_id)
    .bind(TaskStatus::InProgress)
    .bind(worker_id)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .context("assigning claimed task")?;

    tx.commit().await.context("committing claim")?;
    Ok(Some(task))
}

/// Update the heartbeat timestamp for a task still held by `worker_id`.
/// Returns `false` if the task is no longer in progress under that worker
/// (e.g. the janitor already reclaimed it as a zombie).
pub async fn heartbeat(pool: &PgPool, task_id: Uuid, worker_id: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE tasks SET heartbeat_at = $3
        WHERE id = $1 AND worker_id = $2 AND status = $4
        "#,
    )
    .bind(task_id)
    .bind(worker_id)
    .bind(Utc::now())
    .bind(TaskStatus::InProgress)
    .execute(pool)
    .await
    .context("recording heartbeat")?;
    Ok(result.rows_affected() == 1)
}

/// Atomically transition a task from in-progress to completed, recording
/// its validated output, the artifact it produced, and the `task.completed`
/// event -- all inside the caller's transaction so a crash partway through
/// can never leave a completed task with no artifact (or an artifact
/// orphaned by a task still `in_progress`, which would then hit the
/// `(task_id, name)` unique constraint forever on re-run).
///
/// Optimistically locked on `worker_id` so a worker that has since been
/// reclaimed as a zombie can never clobber a retry that another worker
/// already picked up; returns `false` without writing the artifact or
/// event if that race is lost.
#[allow(clippy::too_many_arguments)]
pub async fn complete_task(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    task_id: Uuid,
    job_id: Uuid,
    worker_id: &str,
    output_data: serde_json::Value,
    artifact_name: &str,
    artifact_schema_id: &str,
) -> Result<bool> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET status = $2, output_data = $3, completed_at = $4
        WHERE id = $1 AND worker_id = $5 AND status = $6
        "#,
    )
    .bind(task_id)
    .bind(TaskStatus::Completed)
    .bind(output_data.clone())
    .bind(now)
    .bind(worker_id)
    .bind(TaskStatus::InProgress)
    .execute(&mut **tx)
    .await
    .context("completing task")?;

    if result.rows_affected() != 1 {
        return Ok(false);
    }

    sqlx::query(
        r#"
        INSERT INTO artifacts (id, task_id, name, schema_id, payload, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(task_id)
    .bind(artifact_name)
    .bind(artifact_schema_id)
    .bind(output_data)
    .bind(now)
    .execute(&mut **tx)
    .await
    .context("recording artifact")?;

    sqlx::query(
        r#"
        INSERT INTO system_events (job_id, task_id, event_type, payload, recorded_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(job_id)
    .bind(task_id)
    .bind("task.completed")
    .bind(serde_json::json!({"agent_id": artifact_name}))
    .bind(now)
    .execute(&mut **tx)
    .await
    .context("recording completion event")?;

    Ok(true)
}

/// Outcome of reporting a task failure: either it was returned to the
/// queue for another attempt, or it has exhausted its retries and is now
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Retrying { attempt: i32 },
    Terminal,
}

/// Record a task failure and decide whether to retry it, atomically.
///
/// Mirrors [`ErrorKind::retryable`] against `max_retries`: retryable
/// failures reset the task to pending (clearing `worker_id` so the next
/// claim starts fresh) and increment `retry_count`; everything else is
/// terminal.
pub async fn fail_task(
    pool: &PgPool,
    task_id: Uuid,
    worker_id: &str,
    error_log: &str,
    error_kind: ErrorKind,
    max_retries: i32,
) -> Result<FailOutcome> {
    let mut tx = pool.begin().await.context("starting fail transaction")?;

    let current: Option<i32> = sqlx::query_scalar(
        r#"
        SELECT retry_count FROM tasks
        WHERE id = $1 AND worker_id = $2 AND status = $3
        FOR UPDATE
        "#,
    )
    .bind(task_id)
    .bind(worker_id)
    .bind(TaskStatus::InProgress)
    .fetch_optional(&mut *tx)
    .await
    .context("locking task for failure")?;

    let Some(retry_count) = current else {
        tx.commit().await.ok();
        anyhow::bail!("task {task_id} is no longer held by worker {worker_id}");
    };

    if error_kind.retryable(retry_count, max_retries) {
        let next_attempt = retry_count + 1;
        sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2, error_log = $3, error_kind = $4, retry_count = $5,
                worker_id = NULL, assigned_at = NULL, started_at = NULL, heartbeat_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(TaskStatus::Pending)
        .bind(error_log)
        .bind(error_kind)
        .bind(next_attempt)
        .execute(&mut *tx)
        .await
        .context("resetting task for retry")?;
        tx.commit().await.context("committing retry")?;
        Ok(FailOutcome::Retrying {
            attempt: next_attempt,
        })
    } else {
        sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2, error_log = $3, error_kind = $4, completed_at = $5
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(TaskStatus::Failed)
        .bind(error_log)
        .bind(error_kind)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("terminally failing task")?;
        tx.commit().await.context("committing terminal failure")?;
        Ok(FailOutcome::Terminal)
    }
}

/// Reclaim tasks whose worker has stopped heartbeating.
///
/// A task is a zombie when it is in progress and its last heartbeat is
/// older than `stale_before`. Resetting it to pending (with an
/// incremented retry count, same as any other retryable failure) lets an
/// idle worker pick it back up without operator intervention.
pub async fn reset_zombie_tasks(
    pool: &PgPool,
    stale_before: DateTime<Utc>,
    max_retries: i32,
) -> Result<Vec<Task>> {
    let candidates = sqlx::query_as::<_, Task>(
        r#"
        SELECT id, job_id, agent_id, status, input_data, output_data, error_log, error_kind,
               retry_count, worker_id, created_at, assigned_at, started_at, completed_at,
               heartbeat_at
        FROM tasks
        WHERE status = $1 AND (heartbeat_at IS NULL OR heartbeat_at < $2)
        "#,
    )
    .bind(TaskStatus::InProgress)
    .bind(stale_before)
    .fetch_all(pool)
    .await
    .context("finding zombie tasks")?;

    let mut reclaimed = Vec::with_capacity(candidates.len());
    for task in candidates {
        if task.retry_count >= max_retries {
            sqlx::query(
                r#"
                UPDATE tasks
                SET status = $2, error_kind = $3, error_log = $4, completed_at = $5
                WHERE id = $1 AND status = $6
                "#,
            )
            .bind(task.id)
            .bind(TaskStatus::Failed)
            .bind(ErrorKind::Zombie)
            .bind("worker stopped heartbeating and retries are exhausted")
            .bind(Utc::now())
            .bind(TaskStatus::InProgress)
            .execute(pool)
            .await
            .context("failing exhausted zombie task")?;
        } else {
            sqlx::query(
                r#"
                UPDATE tasks
                SET status = $2, error_kind = $3, error_log = $4, retry_count = retry_count + 1,
                    worker_id = NULL, assigned_at = NULL, started_at = NULL, heartbeat_at = NULL
                WHERE id = $1 AND status = $5
                "#,
            )
            .bind(task.id)
            .bind(TaskStatus::Pending)
            .bind(ErrorKind::Zombie)
            .bind("worker stopped heartbeating")
            .bind(TaskStatus::InProgress)
            .execute(pool)
            .await
            .context("resetting zombie task to pending")?;
        }
        reclaimed.push(task);
    }
    Ok(reclaimed)
}

/// Per-status task counts for a job, used to decide when every task has
/// reached a terminal state.
#[derive(Debug, Clone, Default)]
pub struct JobProgress {
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
}

pub async fn get_job_progress(pool: &PgPool, job_id: Uuid) -> Result<JobProgress> {
    let rows: Vec<(TaskStatus, i64)> = sqlx::query_as(
        r#"
        SELECT status, count(*) FROM tasks WHERE job_id = $1 GROUP BY status
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
    .context("aggregating job progress")?;

    let mut progress = JobProgress::default();
    for (status, count) in rows {
        match status {
            TaskStatus::Pending => progress.pending = count,
            TaskStatus::InProgress => progress.in_progress = count,
            TaskStatus::Completed => progress.completed = count,
            TaskStatus::Failed => progress.failed = count,
        }
    }
    Ok(progress)
}

pub async fn is_job_complete(pool: &PgPool, job_id: Uuid) -> Result<bool> {
    let progress = get_job_progress(pool, job_id).await?;
    Ok(progress.pending == 0 && progress.in_progress == 0)
}

/// Return a terminally failed task to the queue with a clean retry count.
///
/// Used exclusively by the evolution coordinator after installing a new
/// prompt version: the task earned a fresh attempt budget because the
/// thing that was failing it (the prompt) just changed.
pub async fn requeue_after_evolution(pool: &PgPool, task_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET status = $2, retry_count = 0, error_log = NULL, error_kind = NULL,
            worker_id = NULL, assigned_at = NULL, started_at = NULL, completed_at = NULL,
            heartbeat_at = NULL
        WHERE id = $1 AND status = $3
        "#,
    )
    .bind(task_id)
    .bind(TaskStatus::Pending)
    .bind(TaskStatus::Failed)
    .execute(pool)
    .await
    .context("requeuing task after evolution")?;
    Ok(result.rows_affected() == 1)
}

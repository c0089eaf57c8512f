use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::SystemEvent;

/// Append a structured event to the system log. Both `job_id` and
/// `task_id` are optional since some events (e.g. a prompt install) are
/// scoped to neither.
pub async fn record_event(
    pool: &PgPool,
    job_id: Option<Uuid>,
    task_id: Option<Uuid>,
    event_type: &str,
    payload: serde_json::Value,
) -> Result<SystemEvent> {
    sqlx::query_as::<_, SystemEvent>(
        r#"
        INSERT INTO system_events (job_id, task_id, event_type, payload, recorded_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, job_id, task_id, event_type, payload, recorded_at
        "#,
    )
    .bind(job_id)
    .bind(task_id)
    .bind(event_type)
    .bind(payload)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .context("recording system event")
}

pub async fn list_events_for_job(pool: &PgPool, job_id: Uuid) -> Result<Vec<SystemEvent>> {
    sqlx::query_as::<_, SystemEvent>(
        r#"
        SELECT id, job_id, task_id, event_type, payload, recorded_at
        FROM system_events WHERE job_id = $1 ORDER BY recorded_at ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
    .context("listing events for job")
}

pub async fn list_events_for_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<SystemEvent>> {
    sqlx::query_as::<_, SystemEvent>(
        r#"
        SELECT id, job_id, task_id, event_type, payload, recorded_at
        FROM system_events WHERE task_id = $1 ORDER BY recorded_at ASC
        "#,
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .context("listing events for task")
}

/// Count events of a given type for one agent within a job, keyed off the
/// `agent_id` every event of this type embeds in its payload. Used to cap
/// evolution attempts per `(job_id, agent_id)` instead of per job, so one
/// agent's budget is never consumed by another agent's failures.
pub async fn count_events_of_type_for_agent(
    pool: &PgPool,
    job_id: Uuid,
    event_type: &str,
    agent_id: &str,
) -> Result<i64> {
    sqlx::query_scalar(
        r#"
        SELECT count(*) FROM system_events
        WHERE job_id = $1 AND event_type = $2 AND payload ->> 'agent_id' = $3
        "#,
    )
    .bind(job_id)
    .bind(event_type)
    .bind(agent_id)
    .fetch_one(pool)
    .await
    .context("counting events of type for agent")
}

/// Delete events recorded before `cutoff`. Part of the janitor's retention
/// sweep so the system log doesn't grow without bound.
pub async fn purge_events_older_than(pool: &PgPool, cutoff: chrono::DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM system_events WHERE recorded_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await
        .context("purging old system events")?;
    Ok(result.rows_affected())
}

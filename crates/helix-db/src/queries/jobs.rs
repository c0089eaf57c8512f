use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Job, JobStatus};

/// Insert a new job in [`JobStatus::Pending`].
pub async fn insert_job(pool: &PgPool, initial_request: serde_json::Value) -> Result<Job> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query_as::<_, Job>(
        r#"
        INSERT INTO jobs (id, initial_request, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $4)
        RETURNING id, initial_request, status, created_at, updated_at, completed_at, error_message
        "#,
    )
    .bind(id)
    .bind(initial_request)
    .bind(JobStatus::Pending)
    .bind(now)
    .fetch_one(pool)
    .await
    .context("inserting job")
}

pub async fn get_job(pool: &PgPool, id: Uuid) -> Result<Option<Job>> {
    sqlx::query_as::<_, Job>(
        r#"
        SELECT id, initial_request, status, created_at, updated_at, completed_at, error_message
        FROM jobs WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("fetching job")
}

/// List jobs, optionally filtered by status. Null-safe: passing `None`
/// returns every job rather than matching rows where `status IS NULL`
/// (a column that is never nullable here, but the predicate still follows
/// the same `$1::text IS NULL OR status = $1` shape used elsewhere).
pub async fn list_jobs(pool: &PgPool, status: Option<JobStatus>) -> Result<Vec<Job>> {
    let status_str = status.map(|s| s.to_string());
    sqlx::query_as::<_, Job>(
        r#"
        SELECT id, initial_request, status, created_at, updated_at, completed_at, error_message
        FROM jobs
        WHERE $1::text IS NULL OR status = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(status_str)
    .fetch_all(pool)
    .await
    .context("listing jobs")
}

/// Move a job into [`JobStatus::InProgress`] once its first task is claimed.
pub async fn mark_job_in_progress(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE jobs SET status = $2, updated_at = $3
        WHERE id = $1 AND status = $4
        "#,
    )
    .bind(id)
    .bind(JobStatus::InProgress)
    .bind(Utc::now())
    .bind(JobStatus::Pending)
    .execute(pool)
    .await
    .context("marking job in_progress")?;
    Ok(result.rows_affected() == 1)
}

/// Atomically complete a job once every task in its workflow has produced
/// a conforming artifact.
pub async fn complete_job(pool: &PgPool, id: Uuid) -> Result<bool> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE jobs SET status = $2, completed_at = $3, updated_at = $3
        WHERE id = $1 AND status = $4
        "#,
    )
    .bind(id)
    .bind(JobStatus::Completed)
    .bind(now)
    .bind(JobStatus::InProgress)
    .execute(pool)
    .await
    .context("completing job")?;
    Ok(result.rows_affected() == 1)
}

/// Terminally fail a job, recording the triggering error.
pub async fn fail_job(pool: &PgPool, id: Uuid, error_message: &str) -> Result<bool> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE jobs SET status = $2, completed_at = $3, updated_at = $3, error_message = $4
        WHERE id = $1 AND status IN ($5, $6)
        "#,
    )
    .bind(id)
    .bind(JobStatus::Failed)
    .bind(now)
    .bind(error_message)
    .bind(JobStatus::Pending)
    .bind(JobStatus::InProgress)
    .execute(pool)
    .await
    .context("failing job")?;
    Ok(result.rows_affected() == 1)
}

pub async fn cancel_job(pool: &PgPool, id: Uuid) -> Result<bool> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE jobs SET status = $2, completed_at = $3, updated_at = $3
        WHERE id = $1 AND status IN ($4, $5)
        "#,
    )
    .bind(id)
    .bind(JobStatus::Cancelled)
    .bind(now)
    .bind(JobStatus::Pending)
    .bind(JobStatus::InProgress)
    .execute(pool)
    .await
    .context("cancelling job")?;
    Ok(result.rows_affected() == 1)
}

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Artifact;

/// Insert the artifact produced by a completed task.
///
/// The `(task_id, name)` unique constraint enforces artifact uniqueness at
/// the database level: a retried task that completes twice (e.g. a stale
/// worker finishing after it was already reclaimed) can never leave two
/// artifacts behind for the same task and name.
pub async fn insert_artifact(
    pool: &PgPool,
    task_id: Uuid,
    name: &str,
    schema_id: &str,
    payload: serde_json::Value,
) -> Result<Artifact> {
    let id = Uuid::new_v4();
    sqlx::query_as::<_, Artifact>(
        r#"
        INSERT INTO artifacts (id, task_id, name, schema_id, payload, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, task_id, name, schema_id, payload, created_at
        "#,
    )
    .bind(id)
    .bind(task_id)
    .bind(name)
    .bind(schema_id)
    .bind(payload)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .context("inserting artifact")
}

pub async fn get_artifact(pool: &PgPool, task_id: Uuid, name: &str) -> Result<Option<Artifact>> {
    sqlx::query_as::<_, Artifact>(
        r#"
        SELECT id, task_id, name, schema_id, payload, created_at
        FROM artifacts WHERE task_id = $1 AND name = $2
        "#,
    )
    .bind(task_id)
    .bind(name)
    .fetch_optional(pool)
    .await
    .context("fetching artifact")
}

/// All artifacts produced so far within a job, in task creation order.
/// Used to assemble the inputs for the next agent in a workflow's
/// execution order.
pub async fn list_artifacts_for_job(pool: &PgPool, job_id: Uuid) -> Result<Vec<Artifact>> {
    sqlx::query_as::<_, Artifact>(
        r#"
        SELECT a.id, a.task_id, a.name, a.schema_id, a.payload, a.created_at
        FROM artifacts a
        JOIN tasks t ON t.id = a.task_id
        WHERE t.job_id = $1
        ORDER BY a.created_at ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
    .context("listing artifacts for job")
}

/// Batch-fetch artifacts by the task that produced them. Resolves a
/// successor task's `input_data.artifacts` references (each naming a
/// `source_task_id`) in a single round trip instead of one query per
/// referenced artifact.
pub async fn get_artifacts_by_task_ids(pool: &PgPool, task_ids: &[Uuid]) -> Result<Vec<Artifact>> {
    sqlx::query_as::<_, Artifact>(
        r#"
        SELECT id, task_id, name, schema_id, payload, created_at
        FROM artifacts WHERE task_id = ANY($1)
        "#,
    )
    .bind(task_ids)
    .fetch_all(pool)
    .await
    .context("batch-fetching artifacts by task id")
}

/// Artifacts produced by a specific agent's tasks within a job. Workflow
/// advancement binds these by name to the next agent's declared inputs.
pub async fn list_artifacts_for_agent(
    pool: &PgPool,
    job_id: Uuid,
    agent_id: &str,
) -> Result<Vec<Artifact>> {
    sqlx::query_as::<_, Artifact>(
        r#"
        SELECT a.id, a.task_id, a.name, a.schema_id, a.payload, a.created_at
        FROM artifacts a
        JOIN tasks t ON t.id = a.task_id
        WHERE t.job_id = $1 AND t.agent_id = $2
        ORDER BY a.created_at ASC
        "#,
    )
    .bind(job_id)
    .bind(agent_id)
    .fetch_all(pool)
    .await
    .context("listing artifacts for agent")
}

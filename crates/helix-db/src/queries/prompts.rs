use anyhow::{bail, Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Prompt, BASELINE_PROMPT_VERSION};

/// Insert the per-agent baseline prompt if it doesn't already exist yet.
/// The baseline is never active -- it exists purely as the fallback
/// [`get_active_prompt`] returns to once an agent's installed prompt is
/// rolled back past every real version.
pub async fn ensure_baseline(pool: &PgPool, agent_id: &str, prompt_text: &str) -> Result<()> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO prompts (id, agent_id, version, prompt_text, is_active, created_by, created_at)
        VALUES ($1, $2, $3, $4, false, $5, $6)
        ON CONFLICT (agent_id, version) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(agent_id)
    .bind(BASELINE_PROMPT_VERSION)
    .bind(prompt_text)
    .bind("system")
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("seeding baseline prompt")?;
    Ok(())
}

/// Install a new prompt version as the active one for its agent.
///
/// Runs in a transaction so the single-active-prompt invariant, enforced
/// by the partial unique index on `prompts (agent_id) WHERE is_active`,
/// is never observed violated even momentarily: the old active row is
/// deactivated before the new one is inserted active. The baseline
/// version is reserved and can never be (re-)installed over.
pub async fn install_prompt(
    pool: &PgPool,
    agent_id: &str,
    version: &str,
    prompt_text: &str,
    created_by: &str,
) -> Result<Prompt> {
    if version == BASELINE_PROMPT_VERSION {
        bail!("version {BASELINE_PROMPT_VERSION} is reserved for the baseline prompt");
    }

    let mut tx = pool.begin().await.context("starting install transaction")?;

    sqlx::query("UPDATE prompts SET is_active = false WHERE agent_id = $1 AND is_active")
        .bind(agent_id)
        .execute(&mut *tx)
        .await
        .context("deactivating previous prompt")?;

    let id = Uuid::new_v4();
    let prompt = sqlx::query_as::<_, Prompt>(
        r#"
        INSERT INTO prompts (id, agent_id, version, prompt_text, is_active, created_by, created_at)
        VALUES ($1, $2, $3, $4, true, $5, $6)
        RETURNING id, agent_id, version, prompt_text, is_active, created_by, created_at
        "#,
    )
    .bind(id)
    .bind(agent_id)
    .bind(version)
    .bind(prompt_text)
    .bind(created_by)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await
    .context("inserting new prompt version")?;

    tx.commit().await.context("committing prompt install")?;
    Ok(prompt)
}

/// Fetch the agent's active prompt, falling back to the baseline version
/// if nothing is currently active (e.g. every installed version has been
/// rolled back past). Returns `None` only if neither an active prompt nor
/// a baseline has ever been installed for this agent.
pub async fn get_active_prompt(pool: &PgPool, agent_id: &str) -> Result<Option<Prompt>> {
    sqlx::query_as::<_, Prompt>(
        r#"
        SELECT id, agent_id, version, prompt_text, is_active, created_by, created_at
        FROM prompts WHERE agent_id = $1 AND (is_active OR version = $2)
        ORDER BY is_active DESC
        LIMIT 1
        "#,
    )
    .bind(agent_id)
    .bind(BASELINE_PROMPT_VERSION)
    .fetch_optional(pool)
    .await
    .context("fetching active prompt")
}

pub async fn list_versions(pool: &PgPool, agent_id: &str) -> Result<Vec<Prompt>> {
    sqlx::query_as::<_, Prompt>(
        r#"
        SELECT id, agent_id, version, prompt_text, is_active, created_by, created_at
        FROM prompts WHERE agent_id = $1 ORDER BY created_at DESC
        "#,
    )
    .bind(agent_id)
    .fetch_all(pool)
    .await
    .context("listing prompt versions")
}

/// Re-activate a previously installed version, e.g. after an evolved
/// prompt regresses a downstream validation rate.
///
/// Rolling back to the baseline version is special-cased: the baseline
/// is never marked active (that would violate the one-active-version
/// invariant the moment a real version is installed again), so rolling
/// back to it just deactivates whatever is currently active and leaves
/// the agent with no active row -- `get_active_prompt` falls back to the
/// baseline on its own.
pub async fn rollback_to_version(pool: &PgPool, agent_id: &str, version: &str) -> Result<Prompt> {
    let mut tx = pool.begin().await.context("starting rollback transaction")?;

    sqlx::query("UPDATE prompts SET is_active = false WHERE agent_id = $1 AND is_active")
        .bind(agent_id)
        .execute(&mut *tx)
        .await
        .context("deactivating current prompt")?;

    let prompt = if version == BASELINE_PROMPT_VERSION {
        sqlx::query_as::<_, Prompt>(
            r#"
            SELECT id, agent_id, version, prompt_text, is_active, created_by, created_at
            FROM prompts WHERE agent_id = $1 AND version = $2
            "#,
        )
        .bind(agent_id)
        .bind(version)
        .fetch_optional(&mut *tx)
        .await
        .context("fetching baseline prompt")?
        .with_context(|| format!("no baseline prompt installed for agent {agent_id}"))?
    } else {
        sqlx::query_as::<_, Prompt>(
            r#"
            UPDATE prompts SET is_active = true
            WHERE agent_id = $1 AND version = $2
            RETURNING id, agent_id, version, prompt_text, is_active, created_by, created_at
            "#,
        )
        .bind(agent_id)
        .bind(version)
        .fetch_optional(&mut *tx)
        .await
        .context("reactivating prompt version")?
        .with_context(|| format!("no prompt version {version} for agent {agent_id}"))?
    };

    tx.commit().await.context("committing rollback")?;
    Ok(prompt)
}

/// Purge inactive, non-baseline prompt versions past `keep_versions` per
/// agent, keeping the `keep_versions` most recently created. The active
/// version and the baseline are excluded from the count entirely and are
/// never deleted by this sweep, however small `keep_versions` is.
pub async fn purge_old_versions(pool: &PgPool, keep_versions: i64) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM prompts
        WHERE id IN (
            SELECT id FROM (
                SELECT id, row_number() OVER (
                    PARTITION BY agent_id ORDER BY created_at DESC
                ) AS rn
                FROM prompts
                WHERE is_active = false AND version <> $1
            ) ranked
            WHERE rn > $2
        )
        "#,
    )
    .bind(BASELINE_PROMPT_VERSION)
    .bind(keep_versions)
    .execute(pool)
    .await
    .context("purging old prompt versions")?;
    Ok(result.rows_affected())
}

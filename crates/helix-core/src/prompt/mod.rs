//! Prompt Store: the versioned, agent-scoped prompt text each worker
//! fetches before invoking its executor.

use anyhow::Result;
use helix_db::models::Prompt;
use helix_db::queries::prompts;
use sqlx::PgPool;

/// Thin service layer over the prompt queries. Exists so callers depend on
/// a single seam instead of `helix_db::queries::prompts` directly, and so
/// the evolution coordinator and the CLI share the same install/rollback
/// semantics.
pub struct PromptStore<'a> {
    pool: &'a PgPool,
}

impl<'a> PromptStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn active(&self, agent_id: &str) -> Result<Option<Prompt>> {
        prompts::get_active_prompt(self.pool, agent_id).await
    }

    /// Seed the agent's baseline (`v0`) prompt if it hasn't been already.
    /// Idempotent; safe to call on every worker startup.
    pub async fn ensure_baseline(&self, agent_id: &str, prompt_text: &str) -> Result<()> {
        prompts::ensure_baseline(self.pool, agent_id, prompt_text).await
    }

    pub async fn versions(&self, agent_id: &str) -> Result<Vec<Prompt>> {
        prompts::list_versions(self.pool, agent_id).await
    }

    pub async fn install(
        &self,
        agent_id: &str,
        version: &str,
        prompt_text: &str,
        created_by: &str,
    ) -> Result<Prompt> {
        prompts::install_prompt(self.pool, agent_id, version, prompt_text, created_by).await
    }

    pub async fn rollback(&self, agent_id: &str, version: &str) -> Result<Prompt> {
        prompts::rollback_to_version(self.pool, agent_id, version).await
    }
}

//! Orchestrator: submits jobs, drives claimable tasks to completion with
//! bounded concurrency, advances the workflow one stage at a time, and
//! hands terminal failures to the evolution coordinator before giving up
//! on a job.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use helix_db::models::{Task, TaskStatus};
use helix_db::queries::{artifacts, events, jobs, tasks};
use serde_json::json;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::evolution::{EvolutionCoordinator, EvolutionOutcome, PromptEvolver};
use crate::executor::ExecutorRegistry;
use crate::prompt::PromptStore;
use crate::schema::SchemaRegistry;
use crate::worker::{AgentWorker, ArtifactRef, WorkerConfig, WorkerOutcome};
use crate::workflow::{AgentSpec, WorkflowDefinition};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on tasks claimed and executed concurrently.
    pub max_concurrent_tasks: usize,
    /// How long to wait before re-scanning for claimable work when the
    /// queue is momentarily empty (e.g. every task is mid-flight).
    pub idle_poll_interval: Duration,
    /// How often a worker heartbeats a task it is actively executing.
    pub heartbeat_interval: Duration,
    /// How long a single task execution may run before it is aborted and
    /// treated as a transient failure.
    pub task_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            idle_poll_interval: Duration::from_millis(250),
            heartbeat_interval: Duration::from_secs(20),
            task_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorResult {
    Completed,
    Failed,
    Interrupted,
}

pub struct Orchestrator<'a> {
    pool: &'a PgPool,
    workflow: &'a WorkflowDefinition,
    schema_registry: &'a SchemaRegistry,
    executors: &'a ExecutorRegistry,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        pool: &'a PgPool,
        workflow: &'a WorkflowDefinition,
        schema_registry: &'a SchemaRegistry,
        executors: &'a ExecutorRegistry,
    ) -> Self {
        Self {
            pool,
            workflow,
            schema_registry,
            executors,
        }
    }

    /// Seed every agent's baseline (`v0`) prompt if it doesn't exist yet.
    /// Idempotent; call once at startup before driving any job, so a
    /// worker always has a prompt to fall back to even if an operator has
    /// not installed a real version for some agent.
    pub async fn ensure_baselines(&self, default_prompt_text: &str) -> Result<()> {
        let prompt_store = PromptStore::new(self.pool);
        for agent in &self.workflow.agents {
            prompt_store
                .ensure_baseline(&agent.id, default_prompt_text)
                .await
                .with_context(|| format!("seeding baseline prompt for agent {}", agent.id))?;
        }
        Ok(())
    }

    /// Create a job and its first task. The remaining tasks are created
    /// one at a time, as each upstream stage completes.
    pub async fn submit_job(&self, initial_request: serde_json::Value) -> Result<Uuid> {
        let job = jobs::insert_job(self.pool, initial_request.clone())
            .await
            .context("inserting job")?;
        let first = self.workflow.first_agent();
        tasks::insert_task(self.pool, job.id, &first.id, initial_request)
            .await
            .context("inserting first task")?;
        events::record_event(self.pool, Some(job.id), None, "job.submitted", json!({}))
            .await
            .context("recording job submission")?;
        Ok(job.id)
    }

    /// Drive a submitted job to a terminal state: every task completed,
    /// one task terminally failed (after evolution gave up), or the run
    /// was cancelled.
    pub async fn run_job_to_completion(
        &self,
        job_id: Uuid,
        config: &OrchestratorConfig,
        evolver: &dyn PromptEvolver,
        cancel: &CancellationToken,
    ) -> Result<OrchestratorResult> {
        jobs::mark_job_in_progress(self.pool, job_id)
            .await
            .context("marking job in progress")?;

        loop {
            if cancel.is_cancelled() {
                return Ok(OrchestratorResult::Interrupted);
            }

            if tasks::is_job_complete(self.pool, job_id).await? {
                let progress = tasks::get_job_progress(self.pool, job_id).await?;
                return if progress.failed > 0 {
                    jobs::fail_job(self.pool, job_id, "one or more tasks failed terminally").await?;
                    Ok(OrchestratorResult::Failed)
                } else {
                    jobs::complete_job(self.pool, job_id).await?;
                    Ok(OrchestratorResult::Completed)
                };
            }

            let claimable: Vec<Task> = tasks::list_tasks_for_job(self.pool, job_id)
                .await?
                .into_iter()
                .filter(|t| t.status == TaskStatus::Pending)
                .collect();

            if claimable.is_empty() {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(OrchestratorResult::Interrupted),
                    _ = tokio::time::sleep(config.idle_poll_interval) => {}
                }
                continue;
            }

            let results = stream::iter(claimable)
                .map(|task| self.claim_and_run(task, config))
                .buffer_unordered(config.max_concurrent_tasks)
                .collect::<Vec<_>>()
                .await;

            for result in results {
                match result {
                    Ok(Some((task, WorkerOutcome::Completed))) => {
                        self.advance(job_id, &task.agent_id).await?;
                    }
                    Ok(Some((task, WorkerOutcome::Terminal { .. }))) => {
                        self.try_evolve(&task, evolver).await?;
                    }
                    Ok(Some((_, WorkerOutcome::Retrying { .. }))) | Ok(None) => {}
                    Err(err) => warn!(error = %err, "task execution pass failed"),
                }
            }
        }
    }

    async fn claim_and_run(
        &self,
        task: Task,
        config: &OrchestratorConfig,
    ) -> Result<Option<(Task, WorkerOutcome)>> {
        let worker_id = format!("orchestrator-{}", Uuid::new_v4());
        let Some(claimed) = tasks::claim_task(self.pool, &task.agent_id, &worker_id).await? else {
            // Another pass (or another orchestrator instance) already claimed it.
            return Ok(None);
        };

        let Some(executor) = self.executors.get(&claimed.agent_id) else {
            let outcome = tasks::fail_task(
                self.pool,
                claimed.id,
                &worker_id,
                &format!("no executor registered for agent {}", claimed.agent_id),
                helix_db::models::ErrorKind::Orchestration,
                0,
            )
            .await?;
            let worker_outcome = match outcome {
                tasks::FailOutcome::Terminal => WorkerOutcome::Terminal {
                    error_kind: helix_db::models::ErrorKind::Orchestration,
                },
                tasks::FailOutcome::Retrying { attempt } => WorkerOutcome::Retrying { attempt },
            };
            return Ok(Some((claimed, worker_outcome)));
        };

        let worker = AgentWorker::new(self.pool, self.schema_registry, executor.as_ref(), self.workflow);
        let worker_config = WorkerConfig {
            heartbeat_interval: config.heartbeat_interval,
            task_timeout: config.task_timeout,
        };
        let outcome = worker.run(&claimed, &worker_id, &worker_config).await?;
        Ok(Some((claimed, outcome)))
    }

    /// Advance the workflow by one stage: create the successor task with
    /// `input_data.artifacts` pointing at the most recently completed task
    /// from each of its declared upstream agents, plus a `params` copy of
    /// the job's original request.
    async fn advance(&self, job_id: Uuid, completed_agent_id: &str) -> Result<()> {
        if let Some(next) = self.workflow.next_agent(completed_agent_id) {
            let input_data = self.build_successor_input(job_id, next).await?;
            tasks::insert_task(self.pool, job_id, &next.id, input_data)
                .await
                .context("inserting next stage task")?;
            info!(agent_id = %next.id, "advanced workflow to next stage");
        }
        Ok(())
    }

    async fn build_successor_input(&self, job_id: Uuid, next: &AgentSpec) -> Result<serde_json::Value> {
        let mut artifact_refs = Vec::with_capacity(next.input_artifacts.len());
        for producer_agent_id in &next.input_artifacts {
            let produced = artifacts::list_artifacts_for_agent(self.pool, job_id, producer_agent_id)
                .await
                .with_context(|| format!("loading artifacts from {producer_agent_id}"))?;
            if let Some(latest) = produced.last() {
                artifact_refs.push(ArtifactRef {
                    name: producer_agent_id.clone(),
                    source_task_id: latest.task_id,
                });
            }
        }

        let job = jobs::get_job(self.pool, job_id)
            .await
            .context("loading job for successor input")?
            .with_context(|| format!("job {job_id} vanished mid-run"))?;

        Ok(json!({
            "artifacts": artifact_refs,
            "params": job.initial_request,
        }))
    }

    async fn try_evolve(&self, task: &Task, evolver: &dyn PromptEvolver) -> Result<()> {
        let coordinator = EvolutionCoordinator::new(self.pool, evolver);
        match coordinator.handle_terminal_failure(task, self.workflow).await {
            Ok(EvolutionOutcome::Evolved { new_version }) => {
                info!(task_id = %task.id, version = %new_version, "evolved prompt after terminal failure");
            }
            Ok(EvolutionOutcome::CapReached) => {
                warn!(task_id = %task.id, "evolution cap reached; leaving task failed");
            }
            Err(err) => warn!(task_id = %task.id, error = %err, "evolution attempt failed"),
        }
        Ok(())
    }

    /// Restart recovery: reclaim any task left in-progress by a process
    /// that crashed before the janitor's next scheduled sweep. Call once
    /// at startup, before resuming in-flight jobs.
    pub async fn recover_orphaned_tasks(&self, max_retries: i32) -> Result<usize> {
        let cutoff = chrono::Utc::now();
        let reclaimed = tasks::reset_zombie_tasks(self.pool, cutoff, max_retries).await?;
        Ok(reclaimed.len())
    }
}

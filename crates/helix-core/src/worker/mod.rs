//! Agent Worker: runs one already-claimed task through gather inputs,
//! fetch prompt, execute, validate, and record -- the full per-task
//! lifecycle.

use std::time::Duration;

use anyhow::{Context, Result};
use helix_db::models::{ErrorKind, Task};
use helix_db::queries::{artifacts, events, tasks};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::executor::{AgentExecutor, ExecutionRequest, ExecutorError};
use crate::prompt::PromptStore;
use crate::schema::SchemaRegistry;
use crate::workflow::WorkflowDefinition;

/// A pointer to an upstream artifact a successor task consumes, set by
/// [`crate::orchestrator::Orchestrator::advance`] when it creates the
/// task and resolved here by `(source_task_id, name)`. Binding to the
/// exact producing task (rather than re-deriving "whatever this agent's
/// latest artifact is" at run time) keeps a task's inputs fixed at the
/// moment it was created, even if the same agent runs again later in the
/// same job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub name: String,
    pub source_task_id: Uuid,
}

/// How often and how long a worker may run one task attempt before the
/// janitor's zombie sweep would otherwise be the only thing noticing it
/// is still alive.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub heartbeat_interval: Duration,
    pub task_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(20),
            task_timeout: Duration::from_secs(300),
        }
    }
}

/// What happened to a claimed task after one worker pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Completed,
    Retrying { attempt: i32 },
    Terminal { error_kind: ErrorKind },
}

pub struct AgentWorker<'a> {
    pool: &'a PgPool,
    registry: &'a SchemaRegistry,
    executor: &'a dyn AgentExecutor,
    workflow: &'a WorkflowDefinition,
}

impl<'a> AgentWorker<'a> {
    pub fn new(
        pool: &'a PgPool,
        registry: &'a SchemaRegistry,
        executor: &'a dyn AgentExecutor,
        workflow: &'a WorkflowDefinition,
    ) -> Self {
        Self {
            pool,
            registry,
            executor,
            workflow,
        }
    }

    /// Run a claimed task to one terminal outcome for this attempt:
    /// completed, returned to the queue for retry, or terminally failed.
    pub async fn run(&self, task: &Task, worker_id: &str, config: &WorkerConfig) -> Result<WorkerOutcome> {
        let Some(agent) = self.workflow.agent(&task.agent_id) else {
            let outcome = tasks::fail_task(
                self.pool,
                task.id,
                worker_id,
                &format!("no agent {:?} in the active workflow", task.agent_id),
                ErrorKind::Orchestration,
                0,
            )
            .await
            .context("failing task with unknown agent")?;
            return self.record_failure(task, ErrorKind::Orchestration, outcome).await;
        };

        let inputs = match self.gather_inputs(task).await? {
            Some(inputs) => inputs,
            None => {
                return self
                    .handle_failure(
                        task,
                        worker_id,
                        ErrorKind::Orchestration,
                        "an upstream artifact referenced by input_data.artifacts is missing",
                        agent.max_retries,
                    )
                    .await;
            }
        };

        let prompt_store = PromptStore::new(self.pool);
        let prompt = match prompt_store.active(&agent.id).await.context("fetching active prompt")? {
            Some(prompt) => prompt,
            None => {
                return self
                    .handle_failure(
                        task,
                        worker_id,
                        ErrorKind::Orchestration,
                        &format!("no active or baseline prompt installed for agent {}", agent.id),
                        agent.max_retries,
                    )
                    .await;
            }
        };

        let request = ExecutionRequest {
            agent_id: agent.id.clone(),
            prompt: prompt.prompt_text,
            inputs,
        };

        match self.execute_with_heartbeat(task, worker_id, config, request).await {
            Ok(Ok(output)) => self.handle_output(task, worker_id, agent, output).await,
            Ok(Err(ExecutorError::Transient(msg))) => {
                self.handle_failure(task, worker_id, ErrorKind::ExecutorTransient, &msg, agent.max_retries)
                    .await
            }
            Ok(Err(ExecutorError::Permanent(msg))) => {
                self.handle_failure(task, worker_id, ErrorKind::ExecutorPermanent, &msg, agent.max_retries)
                    .await
            }
            Err(_elapsed) => {
                self.handle_failure(
                    task,
                    worker_id,
                    ErrorKind::ExecutorTransient,
                    &format!("execution exceeded the {}s task timeout", config.task_timeout.as_secs()),
                    agent.max_retries,
                )
                .await
            }
        }
    }

    /// Drive the executor call to completion while heartbeating the task
    /// every `heartbeat_interval`, bounded overall by `task_timeout`.
    ///
    /// Uses a `select!` loop rather than spawning the heartbeat ticker as
    /// its own task: the executor future borrows `self.executor`, which is
    /// not `'static`, so it cannot be moved into a separately spawned task.
    async fn execute_with_heartbeat(
        &self,
        task: &Task,
        worker_id: &str,
        config: &WorkerConfig,
        request: ExecutionRequest,
    ) -> std::result::Result<std::result::Result<serde_json::Value, ExecutorError>, tokio::time::error::Elapsed>
    {
        let exec_fut = self.executor.execute(request);
        tokio::pin!(exec_fut);
        let mut ticker = tokio::time::interval(config.heartbeat_interval);
        ticker.tick().await; // first tick fires immediately

        tokio::time::timeout(config.task_timeout, async {
            loop {
                tokio::select! {
                    result = &mut exec_fut => return result,
                    _ = ticker.tick() => {
                        if let Err(err) = tasks::heartbeat(self.pool, task.id, worker_id).await {
                            warn!(task_id = %task.id, error = %err, "heartbeat write failed");
                        }
                    }
                }
            }
        })
        .await
    }

    /// Resolve a task's inputs. The first task in a job carries the raw
    /// job request as `input_data` and is passed through unchanged; every
    /// successor carries `input_data.artifacts`, a list of
    /// `{name, source_task_id}` references built by
    /// [`crate::orchestrator::Orchestrator::advance`], plus an optional
    /// `params` copy of the job-level request. Returns `Ok(None)` if a
    /// referenced artifact cannot be found -- the caller turns that into a
    /// task failure rather than a hard error, since it can only mean a
    /// concurrent data race or an operator manually deleting rows.
    async fn gather_inputs(&self, task: &Task) -> Result<Option<serde_json::Value>> {
        let Some(refs_value) = task.input_data.get("artifacts") else {
            return Ok(Some(task.input_data.clone()));
        };
        let refs: Vec<ArtifactRef> =
            serde_json::from_value(refs_value.clone()).context("parsing input_data.artifacts")?;
        if refs.is_empty() {
            return Ok(Some(task.input_data.clone()));
        }

        let source_task_ids: Vec<Uuid> = refs.iter().map(|r| r.source_task_id).collect();
        let produced = artifacts::get_artifacts_by_task_ids(self.pool, &source_task_ids)
            .await
            .context("batch-loading upstream artifacts")?;

        let mut inputs = serde_json::Map::new();
        for artifact_ref in &refs {
            let Some(artifact) = produced
                .iter()
                .find(|a| a.task_id == artifact_ref.source_task_id && a.name == artifact_ref.name)
            else {
                return Ok(None);
            };
            inputs.insert(artifact_ref.name.clone(), artifact.payload.clone());
        }
        if let Some(params) = task.input_data.get("params") {
            inputs.insert("params".to_string(), params.clone());
        }
        Ok(Some(serde_json::Value::Object(inputs)))
    }

    async fn handle_output(
        &self,
        task: &Task,
        worker_id: &str,
        agent: &crate::workflow::AgentSpec,
        output: serde_json::Value,
    ) -> Result<WorkerOutcome> {
        if let Err(validation_error) = self.registry.validate(&agent.schema_id, &output) {
            return self
                .handle_failure(
                    task,
                    worker_id,
                    ErrorKind::Validation,
                    &validation_error.to_string(),
                    agent.max_retries,
                )
                .await;
        }

        let mut tx = self.pool.begin().await.context("starting completion transaction")?;
        let completed = tasks::complete_task(
            &mut tx,
            task.id,
            task.job_id,
            worker_id,
            output,
            &agent.id,
            &agent.schema_id,
        )
        .await
        .context("completing task")?;
        anyhow::ensure!(
            completed,
            "task {} was no longer held by worker {worker_id} at completion time",
            task.id
        );
        tx.commit().await.context("committing task completion")?;

        Ok(WorkerOutcome::Completed)
    }

    async fn handle_failure(
        &self,
        task: &Task,
        worker_id: &str,
        error_kind: ErrorKind,
        error_log: &str,
        max_retries: i32,
    ) -> Result<WorkerOutcome> {
        let outcome = tasks::fail_task(self.pool, task.id, worker_id, error_log, error_kind, max_retries)
            .await
            .context("recording task failure")?;
        self.record_failure(task, error_kind, outcome).await
    }

    async fn record_failure(
        &self,
        task: &Task,
        error_kind: ErrorKind,
        outcome: tasks::FailOutcome,
    ) -> Result<WorkerOutcome> {
        let (event_type, worker_outcome) = match outcome {
            tasks::FailOutcome::Retrying { attempt } => {
                ("task.retrying", WorkerOutcome::Retrying { attempt })
            }
            tasks::FailOutcome::Terminal => ("task.failed", WorkerOutcome::Terminal { error_kind }),
        };
        events::record_event(
            self.pool,
            Some(task.job_id),
            Some(task.id),
            event_type,
            json!({"agent_id": task.agent_id, "error_kind": error_kind.to_string()}),
        )
        .await
        .context("recording failure event")?;
        Ok(worker_outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use crate::workflow::parse_workflow_toml;
    use helix_db::queries::jobs;
    use helix_test_utils::{create_test_db, drop_test_db};

    fn workflow() -> WorkflowDefinition {
        parse_workflow_toml(
            r#"
                execution_order = ["drafter"]

                [[agents]]
                id = "drafter"
                schema_id = "draft.v1"
            "#,
        )
        .unwrap()
    }

    fn schema_registry() -> SchemaRegistry {
        let registry = SchemaRegistry::new();
        registry
            .register(
                "draft.v1",
                &json!({"type": "object", "required": ["text"]}),
            )
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn successful_execution_completes_and_records_artifact() {
        let (pool, db_name) = create_test_db().await;
        let job = jobs::insert_job(&pool, json!({})).await.unwrap();
        let task = tasks::insert_task(&pool, job.id, "drafter", json!({})).await.unwrap();
        tasks::claim_task(&pool, "drafter", "worker-a").await.unwrap();

        let prompt_store = PromptStore::new(&pool);
        prompt_store
            .install("drafter", "v1", "write a draft", "operator")
            .await
            .unwrap();

        let exec = MockExecutor::new("drafter");
        exec.push_response(Ok(json!({"text": "hello"})));

        let wf = workflow();
        let registry = schema_registry();
        let worker = AgentWorker::new(&pool, &registry, &exec, &wf);

        let outcome = worker.run(&task, "worker-a", &WorkerConfig::default()).await.unwrap();
        assert_eq!(outcome, WorkerOutcome::Completed);

        let artifact = artifacts::get_artifact(&pool, task.id, "drafter")
            .await
            .unwrap();
        assert!(artifact.is_some());

        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn schema_violation_is_a_retryable_validation_failure() {
        let (pool, db_name) = create_test_db().await;
        let job = jobs::insert_job(&pool, json!({})).await.unwrap();
        let task = tasks::insert_task(&pool, job.id, "drafter", json!({})).await.unwrap();
        tasks::claim_task(&pool, "drafter", "worker-a").await.unwrap();

        PromptStore::new(&pool)
            .install("drafter", "v1", "write a draft", "operator")
            .await
            .unwrap();

        let exec = MockExecutor::new("drafter");
        exec.push_response(Ok(json!({"wrong_field": true})));

        let wf = workflow();
        let registry = schema_registry();
        let worker = AgentWorker::new(&pool, &registry, &exec, &wf);

        let outcome = worker.run(&task, "worker-a", &WorkerConfig::default()).await.unwrap();
        assert_eq!(outcome, WorkerOutcome::Retrying { attempt: 1 });

        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn missing_prompt_and_missing_baseline_fails_the_task_instead_of_hanging() {
        let (pool, db_name) = create_test_db().await;
        let job = jobs::insert_job(&pool, json!({})).await.unwrap();
        let task = tasks::insert_task(&pool, job.id, "drafter", json!({})).await.unwrap();
        tasks::claim_task(&pool, "drafter", "worker-a").await.unwrap();

        let exec = MockExecutor::new("drafter");
        let wf = workflow();
        let registry = schema_registry();
        let worker = AgentWorker::new(&pool, &registry, &exec, &wf);

        let outcome = worker.run(&task, "worker-a", &WorkerConfig::default()).await.unwrap();
        assert_eq!(outcome, WorkerOutcome::Terminal { error_kind: ErrorKind::Orchestration });

        let reloaded = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, helix_db::models::TaskStatus::Failed);

        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn falls_back_to_baseline_prompt_when_nothing_is_active() {
        let (pool, db_name) = create_test_db().await;
        let job = jobs::insert_job(&pool, json!({})).await.unwrap();
        let task = tasks::insert_task(&pool, job.id, "drafter", json!({})).await.unwrap();
        tasks::claim_task(&pool, "drafter", "worker-a").await.unwrap();

        PromptStore::new(&pool)
            .ensure_baseline("drafter", "write a draft")
            .await
            .unwrap();

        let exec = MockExecutor::new("drafter");
        exec.push_response(Ok(json!({"text": "hello"})));

        let wf = workflow();
        let registry = schema_registry();
        let worker = AgentWorker::new(&pool, &registry, &exec, &wf);

        let outcome = worker.run(&task, "worker-a", &WorkerConfig::default()).await.unwrap();
        assert_eq!(outcome, WorkerOutcome::Completed);

        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn missing_upstream_artifact_fails_the_task() {
        let (pool, db_name) = create_test_db().await;
        let job = jobs::insert_job(&pool, json!({})).await.unwrap();
        let task = tasks::insert_task(
            &pool,
            job.id,
            "drafter",
            json!({"artifacts": [{"name": "planner", "source_task_id": Uuid::new_v4()}]}),
        )
        .await
        .unwrap();
        tasks::claim_task(&pool, "drafter", "worker-a").await.unwrap();

        PromptStore::new(&pool)
            .install("drafter", "v1", "write a draft", "operator")
            .await
            .unwrap();

        let exec = MockExecutor::new("drafter");
        let wf = workflow();
        let registry = schema_registry();
        let worker = AgentWorker::new(&pool, &registry, &exec, &wf);

        let outcome = worker.run(&task, "worker-a", &WorkerConfig::default()).await.unwrap();
        assert_eq!(outcome, WorkerOutcome::Terminal { error_kind: ErrorKind::Orchestration });

        drop_test_db(&db_name).await;
    }
}

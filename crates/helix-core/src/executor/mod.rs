//! Agent Executor: the seam between the orchestration core and whatever
//! actually runs an agent (a subprocess, an HTTP call to a model provider,
//! a local binary). This crate never ships a concrete executor; callers
//! supply one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

/// Everything a worker gathers before invoking an executor: the prompt
/// text currently active for the agent, and the upstream artifacts this
/// task's agent declared as its inputs.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub agent_id: String,
    pub prompt: String,
    pub inputs: serde_json::Value,
}

/// Why an execution failed. Maps directly onto [`helix_db::models::ErrorKind`]
/// so a worker can decide retry eligibility without inspecting error text.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    #[error("executor timed out or hit a transient failure: {0}")]
    Transient(String),
    #[error("executor failed in a way that will not resolve on retry: {0}")]
    Permanent(String),
}

/// An opaque agent runner. Implementations own process management,
/// network calls, and output capture; this trait only defines the
/// request/response boundary the orchestration core depends on.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// Run one agent invocation to completion and return its raw output,
    /// or an error classifying whether a retry is worthwhile.
    async fn execute(&self, request: ExecutionRequest) -> Result<serde_json::Value, ExecutorError>;
}

/// A test double that returns canned, scripted responses instead of
/// running anything. Every call is recorded so tests can assert on what
/// the worker actually sent.
pub struct MockExecutor {
    name: String,
    responses: std::sync::Mutex<std::collections::VecDeque<Result<serde_json::Value, ExecutorError>>>,
    calls: std::sync::Mutex<Vec<ExecutionRequest>>,
}

impl MockExecutor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: std::sync::Mutex::new(std::collections::VecDeque::new()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Queue the result of the next `execute` call. Calls beyond the
    /// queued responses repeat the last one queued.
    pub fn push_response(&self, response: Result<serde_json::Value, ExecutorError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<ExecutionRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AgentExecutor for MockExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<serde_json::Value, ExecutorError> {
        self.calls.lock().unwrap().push(request);
        let mut queue = self.responses.lock().unwrap();
        match queue.pop_front() {
            Some(r) => r,
            None => Err(ExecutorError::Permanent(
                "MockExecutor has no queued response".to_owned(),
            )),
        }
    }
}

/// Looks up the executor registered for a given agent id. The orchestrator
/// holds one of these rather than a single executor, since a workflow's
/// agents may each be backed by a different kind of executor.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn AgentExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent_id: impl Into<String>, executor: Arc<dyn AgentExecutor>) {
        self.executors.insert(agent_id.into(), executor);
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<dyn AgentExecutor>> {
        self.executors.get(agent_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExecutionRequest {
        ExecutionRequest {
            agent_id: "drafter".to_owned(),
            prompt: "write a draft".to_owned(),
            inputs: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn records_every_call() {
        let exec = MockExecutor::new("drafter");
        exec.push_response(Ok(serde_json::json!({"text": "ok"})));
        exec.execute(request()).await.unwrap();
        assert_eq!(exec.call_count(), 1);
        assert_eq!(exec.calls()[0].agent_id, "drafter");
    }

    #[tokio::test]
    async fn returns_queued_responses_in_order() {
        let exec = MockExecutor::new("drafter");
        exec.push_response(Err(ExecutorError::Transient("rate limited".to_owned())));
        exec.push_response(Ok(serde_json::json!({"text": "ok"})));

        assert!(exec.execute(request()).await.is_err());
        assert!(exec.execute(request()).await.is_ok());
    }

    #[tokio::test]
    async fn no_queued_response_is_a_permanent_error() {
        let exec = MockExecutor::new("drafter");
        let err = exec.execute(request()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Permanent(_)));
    }

    #[test]
    fn registry_looks_up_by_agent_id() {
        let mut registry = ExecutorRegistry::new();
        registry.register("drafter", Arc::new(MockExecutor::new("drafter")));
        assert!(registry.get("drafter").is_some());
        assert!(registry.get("editor").is_none());
        assert_eq!(registry.len(), 1);
    }
}

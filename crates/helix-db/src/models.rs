use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Archived,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Archived => "archived",
        };
        f.write_str(s)
    }
}

impl FromStr for JobStatus {
    type Err = JobStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "archived" => Ok(Self::Archived),
            other => Err(JobStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`JobStatus`] string.
#[derive(Debug, Clone)]
pub struct JobStatusParseError(pub String);

impl fmt::Display for JobStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid job status: {:?}", self.0)
    }
}

impl std::error::Error for JobStatusParseError {}

// ---------------------------------------------------------------------------

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskStatus`] string.
#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ---------------------------------------------------------------------------

/// Closed classification of why a task failed.
///
/// Stored alongside the free-text `error_log` instead of being encoded as a
/// sentinel prefix inside it, so that orchestration logic never needs to
/// pattern-match on human-readable text to decide retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Agent output failed schema validation.
    Validation,
    /// Executor-side timeout, rate limit, or transient network failure.
    ExecutorTransient,
    /// Executor-side failure that will not resolve on retry (bad auth, malformed prompt).
    ExecutorPermanent,
    /// Missing input artifact, unknown agent, or unknown schema -- an orchestration bug.
    Orchestration,
    /// State store connection loss or similar; does not consume a retry.
    Infrastructure,
    /// Worker died silently; recovered by the janitor.
    Zombie,
}

impl ErrorKind {
    /// Whether a task carrying this classification may still be retried,
    /// given its current attempt count against `max_retries`.
    pub fn retryable(&self, retry_count: i32, max_retries: i32) -> bool {
        match self {
            Self::ExecutorPermanent | Self::Orchestration => false,
            Self::Validation | Self::ExecutorTransient | Self::Zombie => {
                retry_count < max_retries
            }
            Self::Infrastructure => true,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::ExecutorTransient => "executor_transient",
            Self::ExecutorPermanent => "executor_permanent",
            Self::Orchestration => "orchestration",
            Self::Infrastructure => "infrastructure",
            Self::Zombie => "zombie",
        };
        f.write_str(s)
    }
}

impl FromStr for ErrorKind {
    type Err = ErrorKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validation" => Ok(Self::Validation),
            "executor_transient" => Ok(Self::ExecutorTransient),
            "executor_permanent" => Ok(Self::ExecutorPermanent),
            "orchestration" => Ok(Self::Orchestration),
            "infrastructure" => Ok(Self::Infrastructure),
            "zombie" => Ok(Self::Zombie),
            other => Err(ErrorKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ErrorKind`] string.
#[derive(Debug, Clone)]
pub struct ErrorKindParseError(pub String);

impl fmt::Display for ErrorKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error kind: {:?}", self.0)
    }
}

impl std::error::Error for ErrorKindParseError {}

// ---------------------------------------------------------------------------

/// Version string reserved for the per-agent baseline prompt: seeded once at
/// init, never marked active, never deleted. [`ErrorKind`] has no dedicated
/// "missing baseline" variant -- a task that can't find even this falls back
/// to [`ErrorKind::Orchestration`], the same non-retryable bucket used for
/// every other orchestration-bug classification.
pub const BASELINE_PROMPT_VERSION: &str = "v0";

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A job -- the top-level user submission.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub initial_request: serde_json::Value,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// A task -- a unit of work for a single agent within a job.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub job_id: Uuid,
    pub agent_id: String,
    pub status: TaskStatus,
    pub input_data: serde_json::Value,
    pub output_data: Option<serde_json::Value>,
    pub error_log: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub retry_count: i32,
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
}

/// An immutable, schema-validated artifact produced by a completed task.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Artifact {
    pub id: Uuid,
    pub task_id: Uuid,
    pub name: String,
    pub schema_id: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A versioned, agent-scoped prompt.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Prompt {
    pub id: Uuid,
    pub agent_id: String,
    pub version: String,
    pub prompt_text: String,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// An append-only structured event (claim, completion, failure, prompt
/// install, zombie recovery, evolution trigger, ...).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SystemEvent {
    pub id: i64,
    pub job_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

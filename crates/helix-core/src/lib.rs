//! Orchestration core for HELIX: the workflow-aware layer that sits on
//! top of `helix-db` and knows how to claim tasks, run agents against
//! them, validate their output, advance a job from one stage to the
//! next, recover from dead workers, and evolve a failing prompt.

pub mod claim;
pub mod config;
pub mod evolution;
pub mod executor;
pub mod janitor;
pub mod orchestrator;
pub mod prompt;
pub mod schema;
pub mod worker;
pub mod workflow;

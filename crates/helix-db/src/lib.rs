//! Durable state layer for the HELIX orchestration core.
//!
//! This crate owns every row that survives a process restart: jobs, tasks,
//! artifacts, prompts, and the append-only system event log. All other
//! crates talk to PostgreSQL exclusively through the functions exposed here.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;

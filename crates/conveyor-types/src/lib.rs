//! Shared domain types for Conveyor.
//!
//! Serializable types for the job queue (definitions, jobs, attempts, worker
//! heartbeats) and the workflow engine (definitions, runs, step runs), plus
//! the error taxonomy and global configuration. No IO, no async.

pub mod config;
pub mod error;
pub mod job;
pub mod workflow;

//! Workflow orchestration: DAG validation, the run engine, the periodic
//! reconciler and event triggers.

pub mod dag;
pub mod engine;
pub mod payload;
pub mod reconciler;
pub mod trigger;

pub use engine::{AdvanceOutcome, WorkflowEngine};
pub use reconciler::{Reconciler, ReconcilerHandle, SweepStats};
pub use trigger::{TriggerBinding, TriggerDispatcher};

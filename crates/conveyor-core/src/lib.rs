//! Job queue and workflow orchestration logic for Conveyor.
//!
//! This crate defines the "ports" (store/repository traits) that the
//! infrastructure layer implements, plus everything that runs on top of
//! them: the worker execution loop, the workflow engine, the reconciler and
//! the trigger/dedupe layer. It depends only on `conveyor-types` -- never on
//! `conveyor-infra` or any database crate.

pub mod queue;
pub mod repository;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

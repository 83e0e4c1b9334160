//! Job queue execution: pure scheduling math, failure classification, the
//! command-builder seam and the worker polling loop.

pub mod backoff;
pub mod classify;
pub mod command;
pub mod worker;

pub use backoff::{NextState, backoff, next_state};
pub use classify::{FailureKind, classify_output};
pub use command::{CommandBuilder, CommandSpec, StaticCommandBuilder};
pub use worker::{Worker, WorkerHandle};

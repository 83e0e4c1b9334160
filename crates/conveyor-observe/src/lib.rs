//! Observability setup for Conveyor.

pub mod tracing_setup;

//! Store/repository trait definitions implemented by `conveyor-infra`.

pub mod job;
pub mod workflow;

pub use job::JobStore;
pub use workflow::WorkflowRepository;

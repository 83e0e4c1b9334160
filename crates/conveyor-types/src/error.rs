use thiserror::Error;

/// Errors from job store operations.
///
/// `Validation` and `Conflict` are rejected synchronously and never mutate
/// state; `Storage` wraps database failures.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("job not found")]
    NotFound,

    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors from workflow engine operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("unknown workflow '{0}'")]
    UnknownWorkflow(String),

    #[error("workflow run not found")]
    RunNotFound,

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("cycle detected involving step '{0}'")]
    CycleDetected(String),

    #[error("duplicate step key '{0}'")]
    DuplicateStep(String),

    #[error("workflow has no steps")]
    EmptyWorkflow,

    #[error("step '{step}' references unknown job definition '{definition}'")]
    UnknownDefinition { step: String, definition: String },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("storage error: {0}")]
    Storage(String),
}

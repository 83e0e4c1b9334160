//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use conveyor_types::error::{QueueError, WorkflowError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Queue(QueueError),
    Workflow(WorkflowError),
    Internal(String),
}

impl From<QueueError> for AppError {
    fn from(e: QueueError) -> Self {
        AppError::Queue(e)
    }
}

impl From<WorkflowError> for AppError {
    fn from(e: WorkflowError) -> Self {
        AppError::Workflow(e)
    }
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Queue(QueueError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            AppError::Queue(QueueError::Conflict(_)) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Queue(QueueError::NotFound) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Queue(QueueError::Storage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
            }
            AppError::Workflow(WorkflowError::UnknownWorkflow(_))
            | AppError::Workflow(WorkflowError::RunNotFound) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            AppError::Workflow(WorkflowError::UnknownDependency { .. })
            | AppError::Workflow(WorkflowError::CycleDetected(_))
            | AppError::Workflow(WorkflowError::DuplicateStep(_))
            | AppError::Workflow(WorkflowError::EmptyWorkflow)
            | AppError::Workflow(WorkflowError::UnknownDefinition { .. }) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            AppError::Workflow(WorkflowError::Queue(inner)) => {
                return AppError::Queue(match inner {
                    QueueError::Validation(m) => QueueError::Validation(m.clone()),
                    QueueError::Conflict(m) => QueueError::Conflict(m.clone()),
                    QueueError::NotFound => QueueError::NotFound,
                    QueueError::Storage(m) => QueueError::Storage(m.clone()),
                })
                .status_and_code();
            }
            AppError::Workflow(WorkflowError::Storage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Queue(e) => e.to_string(),
            AppError::Workflow(e) => e.to_string(),
            AppError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = json!({
            "data": null,
            "errors": [{
                "code": code,
                "message": self.message(),
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

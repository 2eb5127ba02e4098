//! Client error types.

use std::time::Duration;

use thiserror::Error;
use tween_models::{Position, TaskId};

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Targets with no resolvable anchor on one side
    #[error("Unschedulable targets: {}", join_positions(.targets))]
    Unschedulable { targets: Vec<Position> },

    /// No result within the wait budget; the task may still complete
    #[error("No result for {task_id} after {waited:?}")]
    Timeout { task_id: TaskId, waited: Duration },

    /// Withdrawn through the queue before it produced frames
    #[error("Task {task_id} was cancelled")]
    Cancelled { task_id: TaskId },

    #[error("Inference failed for {task_id}: {message}")]
    Inference { task_id: TaskId, message: String },

    #[error("Store error: {0}")]
    Store(#[from] tween_store::StoreError),

    #[error("Media error: {0}")]
    Media(#[from] tween_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] tween_queue::QueueError),

    #[error("Model error: {0}")]
    Model(#[from] tween_models::ModelError),
}

impl ClientError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn inference(task_id: TaskId, message: impl Into<String>) -> Self {
        Self::Inference {
            task_id,
            message: message.into(),
        }
    }

    /// Whether submitting the same work again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Queue(e) => e.is_retryable(),
            _ => false,
        }
    }
}

fn join_positions(positions: &[Position]) -> String {
    positions
        .iter()
        .map(Position::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

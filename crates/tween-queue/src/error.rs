//! Queue error types.

use thiserror::Error;
use tween_models::TaskId;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Malformed task{}: {reason}", task_id.as_ref().map(|id| format!(" {}", id)).unwrap_or_default())]
    MalformedTask {
        task_id: Option<TaskId>,
        reason: String,
    },

    #[error("Frame codec error: {0}")]
    Codec(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            QueueError::Transport(_) => true,
            QueueError::Redis(e) => {
                e.is_io_error()
                    || e.is_timeout()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_task_message() {
        let with_id = QueueError::MalformedTask {
            task_id: Some(TaskId::from_string("task_1")),
            reason: "missing frame_b".to_string(),
        };
        assert_eq!(with_id.to_string(), "Malformed task task_1: missing frame_b");

        let without_id = QueueError::MalformedTask {
            task_id: None,
            reason: "not JSON".to_string(),
        };
        assert_eq!(without_id.to_string(), "Malformed task: not JSON");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(QueueError::transport("reset").is_retryable());
        assert!(!QueueError::validation("bad time").is_retryable());
        assert!(!QueueError::codec("bad png").is_retryable());
    }
}

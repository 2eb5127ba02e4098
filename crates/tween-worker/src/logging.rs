//! Structured task logging.

use tracing::{error, info, Span};
use tween_models::TaskId;

/// Logs task lifecycle events with the task id and frame count attached.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    frames: usize,
}

impl TaskLogger {
    /// Create a logger for a task asking for `frames` outputs.
    pub fn new(task_id: &TaskId, frames: usize) -> Self {
        Self {
            task_id: task_id.to_string(),
            frames,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            frames = self.frames,
            "Task started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(task_id = %self.task_id, "Task progress: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(
            task_id = %self.task_id,
            frames = self.frames,
            "Task failed: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            frames = self.frames,
            "Task completed: {}", message
        );
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Span covering the whole task, for `Instrument`.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("task", task_id = %self.task_id, frames = self.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_logger_carries_id() {
        let task_id = TaskId::from_string("task_42");
        let logger = TaskLogger::new(&task_id, 3);
        assert_eq!(logger.task_id(), "task_42");
    }
}

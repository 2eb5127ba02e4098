//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// The model failed for one task; never fatal to the worker loop
    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Inference service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Queue error: {0}")]
    Queue(#[from] tween_queue::QueueError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }
}

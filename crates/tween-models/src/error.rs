//! Model error types.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid position '{input}': {reason}")]
    InvalidPosition { input: String, reason: String },

    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl ModelError {
    pub fn invalid_position(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPosition {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

//! Frame store error types.

use std::path::PathBuf;

use thiserror::Error;
use tween_models::{Generation, Position};

/// Result type for frame store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during frame store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Repository not found: {0}")]
    RepositoryNotFound(PathBuf),

    #[error("Frame not found at position {0}")]
    FrameNotFound(Position),

    #[error("Metadata not found: {0}")]
    MissingMetadata(PathBuf),

    #[error("Generation conflict at {position}: expected {expected:?}, found {actual:?}")]
    GenerationConflict {
        position: Position,
        expected: Option<Generation>,
        actual: Option<Generation>,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

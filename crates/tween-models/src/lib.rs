//! Shared data models for the tween pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Fractional frame positions with a fixed-precision text form
//! - Frame provenance, generations and anchors
//! - The per-repository video metadata record
//! - Interpolation task identifiers

pub mod error;
pub mod frame;
pub mod metadata;
pub mod position;
pub mod task;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use frame::{Anchor, FrameRecord, Generation, Provenance};
pub use metadata::{AudioStream, ContainerFormat, Rational, VideoMetadata, VideoStream};
pub use position::{Position, POSITION_DECIMALS, TICKS_PER_FRAME};
pub use task::TaskId;

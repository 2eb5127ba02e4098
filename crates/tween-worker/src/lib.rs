//! Interpolation worker.
//!
//! This crate provides:
//! - A serialized task executor over the interpolation queue
//! - The frame interpolator seam and its shipped backends
//! - A dedicated inference thread owning the interpolator
//! - Retry, failure tracking and metrics helpers
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod inference;
pub mod interpolator;
pub mod logging;
pub mod metrics;
pub mod retry;

pub use config::{InterpolatorKind, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use executor::TaskExecutor;
pub use inference::{FrameLimits, InferenceService};
pub use interpolator::{build_interpolator, BlendInterpolator, CommandInterpolator, FrameInterpolator};
pub use logging::TaskLogger;

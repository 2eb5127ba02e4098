//! FFmpeg CLI wrapper for frame repositories.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - A runner that captures diagnostics and enforces timeouts
//! - Metadata probing via FFprobe
//! - Decomposition of a video into frames, audio and metadata
//! - Recomposition of a whole repository or a contiguous frame range

pub mod command;
pub mod decompose;
pub mod error;
pub mod probe;
pub mod progress;
pub mod recompose;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use decompose::{decompose, Decomposition};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_frame_count, probe_metadata};
pub use progress::FfmpegProgress;
pub use recompose::{recompose, recompose_repository, AudioSlice, FrameSelection, Recomposition};

//! Filesystem frame repository.
//!
//! This crate provides:
//! - One lossless PNG per frame, named by fixed-precision position
//! - Atomic (rename-based) commits so listings never see torn writes
//! - A manifest of provenance and generation per position
//! - Metadata and audio locations for a decomposed video

pub mod error;
pub mod manifest;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use manifest::FrameManifest;
pub use store::{FrameStore, AUDIO_FILE, FRAMES_DIR, MANIFEST_FILE, METADATA_FILE};

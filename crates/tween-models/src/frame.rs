//! Frame provenance, generations and anchors.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::position::Position;

/// Where a frame's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Extracted from the source video
    #[default]
    Original,
    /// Synthesized by the interpolation model
    Interpolated,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Original => "original",
            Provenance::Interpolated => "interpolated",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic tag recording when a position became resolvable.
///
/// Decomposed frames are generation 0; every later write gets a larger value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    pub const ORIGINAL: Generation = Generation(0);

    /// The generation that follows this one.
    pub fn next(self) -> Generation {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Provenance and generation of one committed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FrameRecord {
    pub provenance: Provenance,
    pub generation: Generation,
}

impl FrameRecord {
    pub fn original() -> Self {
        Self {
            provenance: Provenance::Original,
            generation: Generation::ORIGINAL,
        }
    }

    pub fn interpolated(generation: Generation) -> Self {
        Self {
            provenance: Provenance::Interpolated,
            generation,
        }
    }
}

/// A resolvable position usable as an interpolation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Anchor {
    pub position: Position,
    pub generation: Generation,
}

impl Anchor {
    pub fn new(position: Position, generation: Generation) -> Self {
        Self { position, generation }
    }

    /// Anchor for an original (generation 0) frame.
    pub fn original(position: Position) -> Self {
        Self::new(position, Generation::ORIGINAL)
    }
}

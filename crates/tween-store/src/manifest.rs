//! Provenance and generation bookkeeping for a repository.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tween_models::{FrameRecord, Generation, Position, Provenance};

use crate::error::StoreResult;

/// Persisted manifest (`manifest.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameManifest {
    /// Generation handed to the next non-original write
    next_generation: Generation,
    frames: BTreeMap<Position, FrameRecord>,
}

impl Default for FrameManifest {
    fn default() -> Self {
        Self {
            next_generation: Generation(1),
            frames: BTreeMap::new(),
        }
    }
}

impl FrameManifest {
    /// Load from disk, or start empty if the file does not exist yet.
    pub async fn load_or_default(path: &Path) -> StoreResult<Self> {
        match fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write atomically (temp file + rename).
    pub async fn save(&self, path: &Path) -> StoreResult<()> {
        let tmp = path.with_extension("json.partial");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub fn record(&self, position: Position) -> Option<FrameRecord> {
        self.frames.get(&position).copied()
    }

    pub fn next_generation(&self) -> Generation {
        self.next_generation
    }

    /// Record an original frame at generation 0.
    pub fn commit_original(&mut self, position: Position) {
        self.frames.insert(position, FrameRecord::original());
    }

    /// Record a new write and allocate its generation.
    pub fn commit(&mut self, position: Position, provenance: Provenance) -> Generation {
        let generation = self.next_generation;
        self.next_generation = generation.next();
        self.frames.insert(position, FrameRecord { provenance, generation });
        generation
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generations_strictly_increase() {
        let mut manifest = FrameManifest::default();
        manifest.commit_original(Position::from_frame(0));
        let g1 = manifest.commit(Position::from_frame(1), Provenance::Interpolated);
        let g2 = manifest.commit(Position::from_frame(2), Provenance::Interpolated);
        assert_eq!(g1, Generation(1));
        assert!(g2 > g1);
        assert_eq!(manifest.next_generation(), Generation(3));
    }

    #[test]
    fn test_rewrite_gets_fresh_generation() {
        let mut manifest = FrameManifest::default();
        let p = Position::from_frame(5);
        manifest.commit_original(p);
        let g = manifest.commit(p, Provenance::Interpolated);
        assert_eq!(manifest.record(p), Some(FrameRecord::interpolated(g)));
        assert_eq!(manifest.len(), 1);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");

        let mut manifest = FrameManifest::default();
        manifest.commit_original(Position::from_frame(3));
        manifest.commit(Position::from_frame(4), Provenance::Interpolated);
        manifest.save(&path).await.unwrap();

        let loaded = FrameManifest::load_or_default(&path).await.unwrap();
        assert_eq!(loaded, manifest);
    }
}

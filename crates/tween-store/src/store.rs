//! Frame repository on the local filesystem.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageFormat, RgbImage};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};
use tween_models::{Anchor, FrameRecord, Generation, Position, Provenance, VideoMetadata};

use crate::error::{StoreError, StoreResult};
use crate::manifest::FrameManifest;

/// Directory holding one PNG per frame.
pub const FRAMES_DIR: &str = "frames";
/// Stream-copied source audio.
pub const AUDIO_FILE: &str = "audio.mka";
/// Metadata record.
pub const METADATA_FILE: &str = "metadata.json";
/// Provenance/generation manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

const FRAME_EXTENSION: &str = "png";

/// Durable mapping from position to raster for one video repository.
///
/// Single-writer by convention: concurrent writers to the same position must
/// be prevented by callers, or use [`FrameStore::put_expecting`].
pub struct FrameStore {
    root: PathBuf,
    manifest: Mutex<FrameManifest>,
}

impl FrameStore {
    /// Create the repository layout (idempotent) and open it.
    pub async fn create(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(FRAMES_DIR)).await?;
        info!("Created frame repository at {}", root.display());
        Self::load(root).await
    }

    /// Open an existing repository.
    pub async fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !fs::try_exists(root.join(FRAMES_DIR)).await? {
            return Err(StoreError::RepositoryNotFound(root));
        }
        Self::load(root).await
    }

    async fn load(root: PathBuf) -> StoreResult<Self> {
        let manifest = FrameManifest::load_or_default(&root.join(MANIFEST_FILE)).await?;
        Ok(Self {
            root,
            manifest: Mutex::new(manifest),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join(FRAMES_DIR)
    }

    /// Path a frame at `position` is (or would be) stored at.
    pub fn frame_path(&self, position: Position) -> PathBuf {
        self.frames_dir()
            .join(format!("{}.{}", position.file_stem(), FRAME_EXTENSION))
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Where decomposition writes the audio track.
    pub fn audio_target(&self) -> PathBuf {
        self.root.join(AUDIO_FILE)
    }

    /// The audio track, if the repository has one.
    pub async fn audio_path(&self) -> StoreResult<Option<PathBuf>> {
        let path = self.audio_target();
        Ok(fs::try_exists(&path).await?.then_some(path))
    }

    /// All committed positions, ascending.
    pub async fn list(&self) -> StoreResult<Vec<Position>> {
        let mut entries = fs::read_dir(self.frames_dir()).await?;
        let mut positions = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FRAME_EXTENSION) {
                continue;
            }
            if let Some(position) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(Position::from_file_stem)
            {
                positions.push(position);
            }
        }

        positions.sort_unstable();
        Ok(positions)
    }

    /// Committed positions within `[first, last]`.
    pub async fn range(&self, first: Position, last: Position) -> StoreResult<Vec<Position>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|p| *p >= first && *p <= last)
            .collect())
    }

    pub async fn contains(&self, position: Position) -> StoreResult<bool> {
        Ok(fs::try_exists(self.frame_path(position)).await?)
    }

    /// Load the raster at `position`.
    pub async fn get(&self, position: Position) -> StoreResult<RgbImage> {
        let bytes = match fs::read(self.frame_path(position)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::FrameNotFound(position))
            }
            Err(e) => return Err(e.into()),
        };
        let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?;
        Ok(image.to_rgb8())
    }

    /// Provenance and generation of a committed frame.
    ///
    /// Frames present on disk but unknown to the manifest are treated as originals.
    pub async fn record(&self, position: Position) -> StoreResult<Option<FrameRecord>> {
        if let Some(record) = self.manifest.lock().await.record(position) {
            return Ok(Some(record));
        }
        Ok(self
            .contains(position)
            .await?
            .then(FrameRecord::original))
    }

    /// Every committed position with its generation, ascending.
    pub async fn anchors(&self) -> StoreResult<Vec<Anchor>> {
        let positions = self.list().await?;
        let manifest = self.manifest.lock().await;
        Ok(positions
            .into_iter()
            .map(|p| {
                let generation = manifest
                    .record(p)
                    .map(|r| r.generation)
                    .unwrap_or(Generation::ORIGINAL);
                Anchor::new(p, generation)
            })
            .collect())
    }

    /// Store a raster as an original frame (generation 0).
    pub async fn put_original(&self, position: Position, raster: &RgbImage) -> StoreResult<()> {
        let mut manifest = self.manifest.lock().await;
        self.write_frame(position, raster).await?;
        self.commit_with(&mut manifest, |m| m.commit_original(position))
            .await
    }

    /// Store a synthesized frame; returns its generation.
    pub async fn put_interpolated(
        &self,
        position: Position,
        raster: &RgbImage,
    ) -> StoreResult<Generation> {
        self.put(position, raster, Provenance::Interpolated).await
    }

    /// Store a frame with an explicit provenance; returns its generation.
    pub async fn put(
        &self,
        position: Position,
        raster: &RgbImage,
        provenance: Provenance,
    ) -> StoreResult<Generation> {
        let mut manifest = self.manifest.lock().await;
        self.write_frame(position, raster).await?;
        let generation = self
            .commit_with(&mut manifest, |m| m.commit(position, provenance))
            .await?;
        debug!(%position, %generation, "Committed {} frame", provenance);
        Ok(generation)
    }

    /// Optimistic write: only succeeds if the position's current generation
    /// equals `expected` (`None` = the position must not exist yet).
    pub async fn put_expecting(
        &self,
        position: Position,
        raster: &RgbImage,
        expected: Option<Generation>,
    ) -> StoreResult<Generation> {
        let mut manifest = self.manifest.lock().await;
        let actual = match manifest.record(position) {
            Some(record) => Some(record.generation),
            None if self.contains(position).await? => Some(Generation::ORIGINAL),
            None => None,
        };
        if actual != expected {
            return Err(StoreError::GenerationConflict {
                position,
                expected,
                actual,
            });
        }

        self.write_frame(position, raster).await?;
        self.commit_with(&mut manifest, |m| m.commit(position, Provenance::Interpolated))
            .await
    }

    /// Duplicate the frame at `source` onto `target`.
    ///
    /// The copy keeps the source's provenance and takes a fresh generation.
    pub async fn copy(&self, source: Position, target: Position) -> StoreResult<Generation> {
        let provenance = self
            .record(source)
            .await?
            .ok_or(StoreError::FrameNotFound(source))?
            .provenance;

        let mut manifest = self.manifest.lock().await;
        let tmp = self.partial_path(target);
        fs::copy(self.frame_path(source), &tmp).await?;
        fs::rename(&tmp, self.frame_path(target)).await?;
        let generation = self
            .commit_with(&mut manifest, |m| m.commit(target, provenance))
            .await?;

        info!("Copied frame {} to {}", source, target);
        Ok(generation)
    }

    /// Move already-encoded PNG files into the store as original frames.
    ///
    /// The manifest is saved once for the whole batch.
    pub async fn adopt_frames<I>(&self, files: I) -> StoreResult<usize>
    where
        I: IntoIterator<Item = (PathBuf, Position)>,
    {
        let mut manifest = self.manifest.lock().await;
        let mut adopted = Vec::new();
        for (file, position) in files {
            fs::rename(&file, self.frame_path(position)).await?;
            adopted.push(position);
        }
        let count = adopted.len();
        self.commit_with(&mut manifest, |m| {
            for position in adopted {
                m.commit_original(position);
            }
        })
        .await?;
        debug!("Adopted {} frames into {}", count, self.root.display());
        Ok(count)
    }

    pub async fn save_metadata(&self, metadata: &VideoMetadata) -> StoreResult<()> {
        let path = self.metadata_path();
        let tmp = path.with_extension("json.partial");
        fs::write(&tmp, serde_json::to_vec_pretty(metadata)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Load the metadata record. A missing record is an error, never defaulted.
    pub async fn load_metadata(&self) -> StoreResult<VideoMetadata> {
        let path = self.metadata_path();
        match fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::MissingMetadata(path))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply `change` to a copy of the manifest; the copy replaces the
    /// in-memory manifest only once it is on disk.
    async fn commit_with<T>(
        &self,
        manifest: &mut FrameManifest,
        change: impl FnOnce(&mut FrameManifest) -> T,
    ) -> StoreResult<T> {
        let mut next = manifest.clone();
        let out = change(&mut next);
        next.save(&self.manifest_path()).await?;
        *manifest = next;
        Ok(out)
    }

    fn partial_path(&self, position: Position) -> PathBuf {
        self.frames_dir()
            .join(format!(".{}.{}.partial", position.file_stem(), FRAME_EXTENSION))
    }

    /// Encode and commit a frame file via temp file + rename.
    async fn write_frame(&self, position: Position, raster: &RgbImage) -> StoreResult<()> {
        let bytes = encode_png(raster)?;
        let tmp = self.partial_path(position);
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, self.frame_path(position)).await?;
        Ok(())
    }
}

fn encode_png(raster: &RgbImage) -> StoreResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    PngEncoder::new(&mut buf).write_image(
        raster.as_raw(),
        raster.width(),
        raster.height(),
        ColorType::Rgb8,
    )?;
    Ok(buf.into_inner())
}

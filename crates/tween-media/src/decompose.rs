//! Split a video into a frame repository.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info};

use tween_models::{Position, VideoMetadata};
use tween_store::FrameStore;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_metadata;

/// Name pattern ffmpeg writes staged frames with.
const STAGED_PATTERN: &str = "%08d.png";

/// Outcome of a decomposition.
#[derive(Debug, Clone, Serialize)]
pub struct Decomposition {
    pub frame_count: usize,
    pub has_audio: bool,
    pub metadata: VideoMetadata,
}

/// Decompose `video` into `store`: metadata, audio track and one original
/// frame per decoded picture at its zero-based index.
///
/// Re-running on the same input rewrites the same frames.
pub async fn decompose(
    video: impl AsRef<Path>,
    store: &FrameStore,
    runner: &FfmpegRunner,
) -> MediaResult<Decomposition> {
    let video = video.as_ref();
    if !video.exists() {
        return Err(MediaError::FileNotFound(video.to_path_buf()));
    }

    let metadata = probe_metadata(video).await?;
    store.save_metadata(&metadata).await?;
    info!(
        video = %video.display(),
        codec = %metadata.video.codec,
        resolution = %metadata.resolution(),
        frame_rate = %metadata.video.frame_rate,
        has_audio = metadata.has_audio(),
        "Probed source video"
    );

    if metadata.has_audio() {
        let cmd = FfmpegCommand::new(store.audio_target())
            .input(video)
            .no_video()
            .map("0:a:0")
            .audio_codec("copy");
        runner.run(&cmd).await?;
        debug!("Extracted audio track to {}", store.audio_target().display());
    }

    // Staging lives inside the repository so adoption is a rename
    let staging = tempfile::Builder::new()
        .prefix(".decompose-")
        .tempdir_in(store.root())?;

    let expected = metadata.video.frame_count;
    let cmd = FfmpegCommand::new(staging.path().join(STAGED_PATTERN))
        .input(video)
        .map("0:v:0")
        .output_args(["-vsync", "passthrough", "-start_number", "0"])
        .pix_fmt("rgb24");
    runner
        .run_with_progress(&cmd, move |progress| {
            if let Some(total) = expected {
                debug!(
                    frame = progress.frame,
                    percent = format!("{:.1}", progress.percentage(total)),
                    "Extracting frames"
                );
            }
        })
        .await?;

    let staged = staged_frames(staging.path()).await?;
    if staged.is_empty() {
        return Err(MediaError::InvalidVideo(format!(
            "no frames decoded from {}",
            video.display()
        )));
    }

    let frame_count = store.adopt_frames(staged).await?;
    info!(
        frame_count,
        repository = %store.root().display(),
        "Decomposed video"
    );

    Ok(Decomposition {
        frame_count,
        has_audio: metadata.has_audio(),
        metadata,
    })
}

/// Staged files paired with the position their numeric name encodes.
async fn staged_frames(dir: &Path) -> MediaResult<Vec<(PathBuf, Position)>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut frames = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let index = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u32>().ok());
        if let Some(index) = index {
            frames.push((path, Position::from_frame(index)));
        }
    }

    frames.sort_by_key(|(_, position)| *position);
    Ok(frames)
}

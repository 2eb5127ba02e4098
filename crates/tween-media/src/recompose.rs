//! Encode frames from a repository back into a video.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info};

use tween_models::{Position, Rational, VideoMetadata};
use tween_store::FrameStore;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Which frames of a repository to encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameSelection {
    #[default]
    All,
    /// Inclusive range of positions
    Range { first: Position, last: Position },
}

/// A window of the repository's audio track to reattach.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSlice {
    pub path: PathBuf,
    pub start_secs: f64,
    /// None keeps the audio until the video ends
    pub duration_secs: Option<f64>,
}

impl AudioSlice {
    /// The whole track.
    pub fn full(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            start_secs: 0.0,
            duration_secs: None,
        }
    }

    /// The window from `first` through the end of the frame at `last`.
    pub fn for_range(
        path: impl Into<PathBuf>,
        rate: Rational,
        first: Position,
        last: Position,
    ) -> Self {
        let span_frames = last.as_f64() - first.as_f64() + 1.0;
        Self {
            path: path.into(),
            start_secs: rate.seconds_for(first.as_f64()),
            duration_secs: Some(rate.seconds_for(span_frames)),
        }
    }
}

/// Outcome of a recomposition.
#[derive(Debug, Clone, Serialize)]
pub struct Recomposition {
    pub output: PathBuf,
    pub frame_count: usize,
    pub with_audio: bool,
}

/// Encode `frames` (in order) into `output` using the source parameters
/// from `metadata`, muxing `audio` when given.
pub async fn recompose(
    frames: &[PathBuf],
    audio: Option<&AudioSlice>,
    metadata: &VideoMetadata,
    output: impl AsRef<Path>,
    runner: &FfmpegRunner,
) -> MediaResult<Recomposition> {
    let output = output.as_ref();
    if frames.is_empty() {
        return Err(MediaError::InvalidVideo("no frames".to_string()));
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let staging = staging_dir(&frames[0])?;
    for (index, frame) in frames.iter().enumerate() {
        let staged = staging.path().join(format!("{:08}.png", index));
        if fs::hard_link(frame, &staged).await.is_err() {
            fs::copy(frame, &staged).await?;
        }
    }
    debug!(
        count = frames.len(),
        staging = %staging.path().display(),
        "Staged frames for encoding"
    );

    let cmd = build_encode_command(&staging.path().join("%08d.png"), audio, metadata, output);
    let total = frames.len() as u64;
    runner
        .run_with_progress(&cmd, move |progress| {
            debug!(
                frame = progress.frame,
                percent = format!("{:.1}", progress.percentage(total)),
                "Encoding"
            );
        })
        .await?;

    info!(
        output = %output.display(),
        frame_count = frames.len(),
        with_audio = audio.is_some(),
        "Recomposed video"
    );

    Ok(Recomposition {
        output: output.to_path_buf(),
        frame_count: frames.len(),
        with_audio: audio.is_some(),
    })
}

/// Recompose a repository, or a contiguous range of it, into `output`.
///
/// For a range, the audio track is trimmed to the span the range covers.
pub async fn recompose_repository(
    store: &FrameStore,
    selection: FrameSelection,
    output: impl AsRef<Path>,
    runner: &FfmpegRunner,
) -> MediaResult<Recomposition> {
    let metadata = store.load_metadata().await?;

    let positions = match selection {
        FrameSelection::All => store.list().await?,
        FrameSelection::Range { first, last } => store.range(first, last).await?,
    };
    let (Some(first), Some(last)) = (positions.first().copied(), positions.last().copied()) else {
        return Err(MediaError::InvalidVideo("no frames".to_string()));
    };

    let audio = store.audio_path().await?.map(|path| match selection {
        FrameSelection::All => AudioSlice::full(path),
        FrameSelection::Range { .. } => {
            AudioSlice::for_range(path, metadata.video.frame_rate, first, last)
        }
    });

    let frames: Vec<PathBuf> = positions.iter().map(|p| store.frame_path(*p)).collect();
    recompose(&frames, audio.as_ref(), &metadata, output, runner).await
}

/// Temp dir next to the frames so staging can hard link.
fn staging_dir(sample_frame: &Path) -> MediaResult<tempfile::TempDir> {
    let base = sample_frame.parent().and_then(Path::parent);
    let dir = match base {
        Some(base) if base.is_dir() => tempfile::Builder::new()
            .prefix(".recompose-")
            .tempdir_in(base)?,
        _ => tempfile::Builder::new().prefix("tween-recompose-").tempdir()?,
    };
    Ok(dir)
}

pub(crate) fn build_encode_command(
    pattern: &Path,
    audio: Option<&AudioSlice>,
    metadata: &VideoMetadata,
    output: &Path,
) -> FfmpegCommand {
    let video = &metadata.video;

    let mut cmd = FfmpegCommand::new(output).input_with(
        [
            "-framerate".to_string(),
            video.frame_rate.to_string(),
            "-start_number".to_string(),
            "0".to_string(),
        ],
        pattern,
    );

    if let Some(audio) = audio {
        let mut args = vec!["-ss".to_string(), format!("{:.6}", audio.start_secs)];
        if let Some(duration) = audio.duration_secs {
            args.push("-t".to_string());
            args.push(format!("{:.6}", duration));
        }
        cmd = cmd.input_with(args, &audio.path);
    }

    cmd = cmd
        .map("0:v:0")
        .video_codec(video.codec.clone())
        .pix_fmt(video.pix_fmt.clone())
        .size(video.width, video.height)
        .frame_rate(video.frame_rate);

    if let Some(color_space) = &video.color_space {
        cmd = cmd.output_args(["-colorspace", color_space.as_str()]);
    }

    if audio.is_some() {
        cmd = cmd.map("1:a:0").audio_codec("copy").shortest();
    }

    if output.extension().is_none() {
        cmd = cmd.format(metadata.container.primary_format().to_string());
    }

    cmd
}

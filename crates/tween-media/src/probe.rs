//! FFprobe metadata extraction.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use tween_models::{AudioStream, ContainerFormat, Rational, VideoMetadata, VideoStream};

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    pix_fmt: Option<String>,
    color_space: Option<String>,
    nb_frames: Option<String>,
    nb_read_frames: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
}

/// Probe a video file and build the metadata needed to re-encode it.
///
/// Fails with [`MediaError::MissingMetadata`] when a required video field
/// (codec, dimensions, frame rate, pixel format) cannot be determined.
pub async fn probe_metadata(path: impl AsRef<Path>) -> MediaResult<VideoMetadata> {
    let path = path.as_ref();
    let stdout = run_ffprobe(
        path,
        &["-v", "error", "-print_format", "json", "-show_format", "-show_streams"],
    )
    .await?;
    metadata_from_probe(&stdout)
}

/// Count decodable video frames. Slower than [`probe_metadata`] since the
/// whole stream is decoded.
pub async fn probe_frame_count(path: impl AsRef<Path>) -> MediaResult<u64> {
    let path = path.as_ref();
    let stdout = run_ffprobe(
        path,
        &[
            "-v",
            "error",
            "-count_frames",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=nb_read_frames",
            "-print_format",
            "json",
        ],
    )
    .await?;

    let probe: FfprobeOutput = serde_json::from_slice(&stdout)?;
    probe
        .streams
        .first()
        .and_then(|s| s.nb_read_frames.as_deref())
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| MediaError::missing_metadata("nb_read_frames"))
}

async fn run_ffprobe(path: &Path, args: &[&str]) -> MediaResult<Vec<u8>> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args(args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed on {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        });
    }

    Ok(output.stdout)
}

/// Build [`VideoMetadata`] from raw ffprobe JSON.
pub(crate) fn metadata_from_probe(json: &[u8]) -> MediaResult<VideoMetadata> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MediaError::missing_metadata("video stream"))?;

    let frame_rate = [&video_stream.r_frame_rate, &video_stream.avg_frame_rate]
        .into_iter()
        .flatten()
        .find_map(|r| r.parse::<Rational>().ok())
        .ok_or_else(|| MediaError::missing_metadata("frame_rate"))?;

    let video = VideoStream {
        codec: video_stream
            .codec_name
            .clone()
            .ok_or_else(|| MediaError::missing_metadata("codec_name"))?,
        width: video_stream
            .width
            .filter(|w| *w > 0)
            .ok_or_else(|| MediaError::missing_metadata("width"))?,
        height: video_stream
            .height
            .filter(|h| *h > 0)
            .ok_or_else(|| MediaError::missing_metadata("height"))?,
        frame_rate,
        pix_fmt: video_stream
            .pix_fmt
            .clone()
            .ok_or_else(|| MediaError::missing_metadata("pix_fmt"))?,
        color_space: video_stream
            .color_space
            .clone()
            .filter(|c| c != "unknown" && c != "reserved"),
        frame_count: video_stream.nb_frames.as_deref().and_then(|n| n.parse().ok()),
    };

    // Audio is optional; a stream we cannot describe is ignored
    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .and_then(|s| {
            Some(AudioStream {
                codec: s.codec_name.clone()?,
                sample_rate: s.sample_rate.as_deref()?.parse().ok()?,
                channels: s.channels?,
                channel_layout: s.channel_layout.clone(),
            })
        });

    let format = probe
        .format
        .ok_or_else(|| MediaError::missing_metadata("format"))?;
    let container = ContainerFormat {
        format_name: format
            .format_name
            .ok_or_else(|| MediaError::missing_metadata("format_name"))?,
        duration: format.duration.as_deref().and_then(|d| d.parse().ok()),
    };

    Ok(VideoMetadata {
        video,
        audio,
        container,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "codec_type": "video",
                "codec_name": "h264",
                "width": 1280,
                "height": 720,
                "r_frame_rate": "30000/1001",
                "avg_frame_rate": "30000/1001",
                "pix_fmt": "yuv420p",
                "color_space": "bt709",
                "nb_frames": "300"
            },
            {
                "codec_type": "audio",
                "codec_name": "aac",
                "sample_rate": "48000",
                "channels": 2,
                "channel_layout": "stereo"
            }
        ],
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "10.010000"
        }
    }"#;

    #[test]
    fn test_metadata_from_probe() {
        let metadata = metadata_from_probe(SAMPLE.as_bytes()).unwrap();

        assert_eq!(metadata.video.codec, "h264");
        assert_eq!(metadata.resolution(), "1280x720");
        assert_eq!(metadata.video.frame_rate, Rational::new(30000, 1001).unwrap());
        assert_eq!(metadata.video.color_space.as_deref(), Some("bt709"));
        assert_eq!(metadata.video.frame_count, Some(300));
        assert_eq!(metadata.container.primary_format(), "mov");

        let audio = metadata.audio.unwrap();
        assert_eq!(audio.codec, "aac");
        assert_eq!(audio.sample_rate, 48000);
        assert_eq!(audio.channels, 2);
    }

    #[test]
    fn test_missing_pix_fmt_is_reported() {
        let json = r#"{
            "streams": [{"codec_type": "video", "codec_name": "h264", "width": 64,
                         "height": 64, "r_frame_rate": "24/1"}],
            "format": {"format_name": "matroska,webm"}
        }"#;

        let err = metadata_from_probe(json.as_bytes()).unwrap_err();
        assert!(matches!(err, MediaError::MissingMetadata(ref f) if f == "pix_fmt"));
    }

    #[test]
    fn test_unusable_frame_rate_falls_back_to_average() {
        let json = r#"{
            "streams": [{"codec_type": "video", "codec_name": "vp9", "width": 64,
                         "height": 64, "r_frame_rate": "0/0", "avg_frame_rate": "25/1",
                         "pix_fmt": "yuv420p", "color_space": "unknown"}],
            "format": {"format_name": "matroska,webm"}
        }"#;

        let metadata = metadata_from_probe(json.as_bytes()).unwrap();
        assert_eq!(metadata.video.frame_rate, Rational::new(25, 1).unwrap());
        assert!(metadata.video.color_space.is_none());
        assert!(!metadata.has_audio());
    }

    #[test]
    fn test_no_video_stream() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"format_name": "wav"}}"#;
        assert!(matches!(
            metadata_from_probe(json.as_bytes()),
            Err(MediaError::MissingMetadata(ref f)) if f == "video stream"
        ));
    }
}

//! Per-repository video metadata record.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Rational frame rate, e.g. `30000/1001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    pub fn new(num: u32, den: u32) -> ModelResult<Self> {
        if num == 0 || den == 0 {
            return Err(ModelError::InvalidFrameRate(format!("{}/{}", num, den)));
        }
        Ok(Self { num, den })
    }

    /// Frames per second as a float.
    pub fn as_f64(&self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration in seconds of `frames` frames at this rate.
    pub fn seconds_for(&self, frames: f64) -> f64 {
        frames * f64::from(self.den) / f64::from(self.num)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for Rational {
    type Err = ModelError;

    /// Parse `num/den` as printed by ffprobe, or a bare integer rate.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidFrameRate(s.to_string());
        match s.trim().split_once('/') {
            Some((num, den)) => Rational::new(
                num.trim().parse().map_err(|_| invalid())?,
                den.trim().parse().map_err(|_| invalid())?,
            ),
            None => Rational::new(s.trim().parse().map_err(|_| invalid())?, 1),
        }
    }
}

/// Video stream descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoStream {
    /// Codec name as reported by ffprobe (e.g. "h264")
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    /// Pixel format (e.g. "yuv420p")
    pub pix_fmt: String,
    #[serde(default)]
    pub color_space: Option<String>,
    /// Frame count when the container declares it
    #[serde(default)]
    pub frame_count: Option<u64>,
}

/// Audio stream descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioStream {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u32,
    #[serde(default)]
    pub channel_layout: Option<String>,
}

/// Container descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContainerFormat {
    /// Comma-separated muxer names (e.g. "mov,mp4,m4a,3gp,3g2,mj2")
    pub format_name: String,
    #[serde(default)]
    pub duration: Option<f64>,
}

impl ContainerFormat {
    /// First muxer name in the list.
    pub fn primary_format(&self) -> &str {
        self.format_name.split(',').next().unwrap_or("").trim()
    }
}

/// Metadata persisted once per repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoMetadata {
    pub video: VideoStream,
    /// Absent when the source has no audio
    pub audio: Option<AudioStream>,
    pub container: ContainerFormat,
}

impl VideoMetadata {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Resolution as `WxH`.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.video.width, self.video.height)
    }
}

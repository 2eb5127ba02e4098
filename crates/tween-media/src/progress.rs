//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Frames written so far
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Progress percentage given the expected number of frames.
    pub fn percentage(&self, total_frames: u64) -> f64 {
        if total_frames == 0 {
            return 0.0;
        }
        ((self.frame as f64 / total_frames as f64) * 100.0).min(100.0)
    }

    /// Apply one stderr line and classify it.
    pub(crate) fn apply_line(&mut self, line: &str) -> ProgressLine {
        let Some((key, value)) = line.trim().split_once('=') else {
            return ProgressLine::Diagnostic;
        };
        match key {
            "frame" => {
                if let Ok(frame) = value.trim().parse() {
                    self.frame = frame;
                }
            }
            "out_time_us" | "out_time_ms" => {
                // Both keys carry microseconds in current FFmpeg builds
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "speed" => {
                if let Some(speed) = value.trim().strip_suffix('x').and_then(|s| s.parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                self.is_complete = value == "end";
                return ProgressLine::Snapshot;
            }
            "fps" | "bitrate" | "total_size" | "out_time" | "dup_frames" | "drop_frames"
            | "stream_0_0_q" => {}
            _ => return ProgressLine::Diagnostic,
        }
        ProgressLine::Field
    }
}

/// Classification of one stderr line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProgressLine {
    /// A progress field
    Field,
    /// End of a progress block; a snapshot should be reported
    Snapshot,
    /// Anything else (kept as diagnostic output)
    Diagnostic,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_block() {
        let mut progress = FfmpegProgress::default();
        assert_eq!(progress.apply_line("frame=120"), ProgressLine::Field);
        assert_eq!(progress.apply_line("out_time_us=5000000"), ProgressLine::Field);
        assert_eq!(progress.apply_line("speed=1.5x"), ProgressLine::Field);
        assert_eq!(progress.apply_line("progress=end"), ProgressLine::Snapshot);

        assert_eq!(progress.frame, 120);
        assert_eq!(progress.out_time_ms, 5000);
        assert!((progress.speed - 1.5).abs() < 0.01);
        assert!(progress.is_complete);
    }

    #[test]
    fn test_diagnostics_are_not_progress() {
        let mut progress = FfmpegProgress::default();
        assert_eq!(
            progress.apply_line("Error opening input file missing.mp4."),
            ProgressLine::Diagnostic
        );
        assert_eq!(
            progress.apply_line("[png @ 0x55] Invalid PNG signature 0x00=1"),
            ProgressLine::Diagnostic
        );
    }

    #[test]
    fn test_percentage() {
        let progress = FfmpegProgress {
            frame: 50,
            ..Default::default()
        };
        assert!((progress.percentage(200) - 25.0).abs() < 0.01);
        assert_eq!(progress.percentage(0), 0.0);
    }
}

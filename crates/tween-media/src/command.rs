//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use tween_models::Rational;

use crate::error::{MediaError, MediaResult};
use crate::progress::{FfmpegProgress, ProgressLine};

/// Number of diagnostic stderr lines kept for error reports.
const DIAGNOSTIC_TAIL_LINES: usize = 40;

/// One `-i` input together with the options that precede it.
#[derive(Debug, Clone)]
struct FfmpegInput {
    args: Vec<String>,
    path: PathBuf,
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Inputs in `-i` order; stream specifiers refer to this index
    inputs: Vec<FfmpegInput>,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after all inputs)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an input without input options.
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.input_with(std::iter::empty::<String>(), path)
    }

    /// Add an input preceded by input options (e.g. `-framerate`, `-ss`).
    pub fn input_with<I, S>(mut self, args: I, path: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(FfmpegInput {
            args: args.into_iter().map(Into::into).collect(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    /// Add an output argument.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Select a stream for the output (`-map`).
    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Drop video streams from the output.
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Set output pixel format.
    pub fn pix_fmt(self, pix_fmt: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(pix_fmt)
    }

    /// Set output frame size.
    pub fn size(self, width: u32, height: u32) -> Self {
        self.output_arg("-s").output_arg(format!("{}x{}", width, height))
    }

    /// Set output frame rate.
    pub fn frame_rate(self, rate: Rational) -> Self {
        self.output_arg("-r").output_arg(rate.to_string())
    }

    /// Force the output muxer.
    pub fn format(self, muxer: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(muxer)
    }

    /// Stop when the shortest input ends.
    pub fn shortest(self) -> Self {
        self.output_arg("-shortest")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Output path.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking and timeouts.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    /// Create a new runner without a timeout.
    pub fn new() -> Self {
        Self { timeout_secs: None }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with a progress callback.
    ///
    /// Non-progress stderr lines are kept and attached to
    /// [`MediaError::FfmpegFailed`] when the process exits unsuccessfully.
    pub async fn run_with_progress<F>(
        &self,
        cmd: &FfmpegCommand,
        progress_callback: F,
    ) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stderr was not captured", None, None))?;
        let mut reader = BufReader::new(stderr).lines();

        let stderr_handle = tokio::spawn(async move {
            let mut current = FfmpegProgress::default();
            let mut diagnostics = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);

            while let Ok(Some(line)) = reader.next_line().await {
                match current.apply_line(&line) {
                    ProgressLine::Snapshot => progress_callback(current.clone()),
                    ProgressLine::Field => {}
                    ProgressLine::Diagnostic => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if diagnostics.len() == DIAGNOSTIC_TAIL_LINES {
                            diagnostics.pop_front();
                        }
                        diagnostics.push_back(line);
                    }
                }
            }

            Vec::from(diagnostics).join("\n")
        });

        let status = self.wait_for_completion(&mut child).await;
        let diagnostics = stderr_handle.await.unwrap_or_default();

        match status? {
            Some(code) if code != 0 => Err(MediaError::ffmpeg_failed(
                format!("FFmpeg exited with status {} writing {}", code, cmd.output().display()),
                non_empty(diagnostics),
                Some(code),
            )),
            Some(_) => Ok(()),
            None => Err(MediaError::ffmpeg_failed(
                "FFmpeg terminated by signal",
                non_empty(diagnostics),
                None,
            )),
        }
    }

    /// Wait for the child process, killing it on timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<Option<i32>> {
        let status = match self.timeout_secs {
            Some(timeout_secs) => {
                match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await {
                    Ok(result) => result?,
                    Err(_) => {
                        warn!("FFmpeg timed out after {} seconds, killing process", timeout_secs);
                        let _ = child.kill().await;
                        return Err(MediaError::Timeout(timeout_secs));
                    }
                }
            }
            None => child.wait().await?,
        };

        Ok(status.code())
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder_orders_inputs() {
        let cmd = FfmpegCommand::new("out.mp4")
            .input_with(["-framerate", "24/1"], "frames/%08d.png")
            .input_with(["-ss", "1.000000"], "audio.mka")
            .map("0:v:0")
            .map("1:a:0")
            .video_codec("h264");

        let args = cmd.build_args();
        let first_input = args.iter().position(|a| a == "frames/%08d.png").unwrap();
        let second_input = args.iter().position(|a| a == "audio.mka").unwrap();
        let framerate = args.iter().position(|a| a == "-framerate").unwrap();
        let seek = args.iter().position(|a| a == "-ss").unwrap();
        let codec = args.iter().position(|a| a == "-c:v").unwrap();

        assert!(framerate < first_input);
        assert!(first_input < seek && seek < second_input);
        assert!(second_input < codec);
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
        assert_eq!(args[0], "-y");
    }

    #[test]
    fn test_output_helpers() {
        let cmd = FfmpegCommand::new("out.mkv")
            .input("in.mp4")
            .size(640, 360)
            .frame_rate(Rational::new(30000, 1001).unwrap())
            .pix_fmt("yuv420p")
            .shortest();

        let args = cmd.build_args();
        assert!(args.contains(&"640x360".to_string()));
        assert!(args.contains(&"30000/1001".to_string()));
        assert!(args.contains(&"yuv420p".to_string()));
        assert!(args.contains(&"-shortest".to_string()));
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_failure_carries_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = FfmpegCommand::new(dir.path().join("out.mp4")).input(dir.path().join("missing.mp4"));

        let err = FfmpegRunner::new().run(&cmd).await.unwrap_err();
        match err {
            MediaError::FfmpegFailed { stderr, exit_code, .. } => {
                assert!(exit_code.is_some());
                assert!(stderr.unwrap_or_default().contains("missing.mp4"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

//! Frame interpolation backends.

use std::path::Path;
use std::process::{Command, Stdio};

use image::{Rgb, RgbImage};
use tracing::debug;

use crate::config::{InterpolatorKind, WorkerConfig};
use crate::error::{WorkerError, WorkerResult};

/// Synthesizes the frame at fraction `t` between two equally sized frames.
///
/// Implementations run on the inference thread and may keep mutable model
/// state between calls.
pub trait FrameInterpolator: Send + 'static {
    fn stage_name(&self) -> &str {
        "FrameInterpolator"
    }

    fn interpolate(&mut self, a: &RgbImage, b: &RgbImage, t: f64) -> WorkerResult<RgbImage>;
}

/// Linear cross-fade between the two frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlendInterpolator;

impl FrameInterpolator for BlendInterpolator {
    fn stage_name(&self) -> &str {
        "Blend"
    }

    fn interpolate(&mut self, a: &RgbImage, b: &RgbImage, t: f64) -> WorkerResult<RgbImage> {
        if a.dimensions() != b.dimensions() {
            return Err(WorkerError::inference(format!(
                "frame sizes differ: {:?} vs {:?}",
                a.dimensions(),
                b.dimensions()
            )));
        }
        let t = t.clamp(0.0, 1.0);
        Ok(RgbImage::from_fn(a.width(), a.height(), |x, y| {
            let pa = a.get_pixel(x, y).0;
            let pb = b.get_pixel(x, y).0;
            let mix = |i: usize| {
                (f64::from(pa[i]) * (1.0 - t) + f64::from(pb[i]) * t)
                    .round()
                    .clamp(0.0, 255.0) as u8
            };
            Rgb([mix(0), mix(1), mix(2)])
        }))
    }
}

/// Runs an external model program once per frame.
///
/// The template is split on whitespace; `{a}`, `{b}` and `{out}` are
/// replaced with PNG paths in a private scratch directory and `{t}` with the
/// fraction.
#[derive(Debug)]
pub struct CommandInterpolator {
    template: Vec<String>,
    scratch: tempfile::TempDir,
}

impl CommandInterpolator {
    pub fn new(template: &str) -> WorkerResult<Self> {
        let template: Vec<String> = template.split_whitespace().map(str::to_string).collect();
        if template.is_empty() {
            return Err(WorkerError::config_error("model command is empty"));
        }
        if !template.iter().any(|arg| arg.contains("{out}")) {
            return Err(WorkerError::config_error(
                "model command must reference {out}",
            ));
        }
        let scratch = tempfile::Builder::new().prefix("tween-model-").tempdir()?;
        Ok(Self { template, scratch })
    }

    fn render_args(&self, a: &Path, b: &Path, t: f64, out: &Path) -> Vec<String> {
        let t = format!("{:.6}", t);
        self.template
            .iter()
            .map(|arg| {
                arg.replace("{a}", &a.to_string_lossy())
                    .replace("{b}", &b.to_string_lossy())
                    .replace("{t}", &t)
                    .replace("{out}", &out.to_string_lossy())
            })
            .collect()
    }
}

impl FrameInterpolator for CommandInterpolator {
    fn stage_name(&self) -> &str {
        "Command"
    }

    fn interpolate(&mut self, a: &RgbImage, b: &RgbImage, t: f64) -> WorkerResult<RgbImage> {
        let dir = self.scratch.path();
        let (path_a, path_b, path_out) = (dir.join("a.png"), dir.join("b.png"), dir.join("out.png"));
        a.save(&path_a)?;
        b.save(&path_b)?;
        if path_out.exists() {
            std::fs::remove_file(&path_out)?;
        }

        let args = self.render_args(&path_a, &path_b, t, &path_out);
        debug!("Running model: {}", args.join(" "));
        let output = Command::new(&args[0])
            .args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkerError::inference(format!(
                "model exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let produced = image::open(&path_out)
            .map_err(|e| WorkerError::inference(format!("model output unreadable: {}", e)))?;
        Ok(produced.to_rgb8())
    }
}

/// Build the backend selected by `config`.
pub fn build_interpolator(config: &WorkerConfig) -> WorkerResult<Box<dyn FrameInterpolator>> {
    match config.interpolator {
        InterpolatorKind::Blend => Ok(Box::new(BlendInterpolator)),
        InterpolatorKind::Command => {
            let template = config.model_command.as_deref().ok_or_else(|| {
                WorkerError::config_error("WORKER_MODEL_COMMAND is required for the command interpolator")
            })?;
            Ok(Box::new(CommandInterpolator::new(template)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(4, 3, Rgb([value, value, value]))
    }

    #[test]
    fn test_blend_midpoint() {
        let out = BlendInterpolator.interpolate(&solid(0), &solid(200), 0.5).unwrap();
        assert_eq!(out, solid(100));

        let near_a = BlendInterpolator.interpolate(&solid(0), &solid(200), 0.25).unwrap();
        assert_eq!(near_a.get_pixel(0, 0).0, [50, 50, 50]);
    }

    #[test]
    fn test_blend_rejects_mismatched_sizes() {
        let small = RgbImage::new(2, 2);
        let err = BlendInterpolator.interpolate(&small, &solid(0), 0.5).unwrap_err();
        assert!(matches!(err, WorkerError::Inference(_)));
    }

    #[test]
    fn test_command_template_validation() {
        assert!(CommandInterpolator::new("").is_err());
        assert!(CommandInterpolator::new("model {a} {b}").is_err());
        assert!(CommandInterpolator::new("model {a} {b} {t} {out}").is_ok());
    }

    #[test]
    fn test_command_args_substitution() {
        let interpolator = CommandInterpolator::new("rife --ratio={t} {a} {b} -o {out}").unwrap();
        let args = interpolator.render_args(
            Path::new("/x/a.png"),
            Path::new("/x/b.png"),
            0.25,
            Path::new("/x/out.png"),
        );
        assert_eq!(
            args,
            vec!["rife", "--ratio=0.250000", "/x/a.png", "/x/b.png", "-o", "/x/out.png"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_command_runs_program() {
        let mut interpolator = CommandInterpolator::new("cp {b} {out}").unwrap();
        let out = interpolator.interpolate(&solid(10), &solid(90), 0.5).unwrap();
        assert_eq!(out, solid(90));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_failure_is_inference_error() {
        let mut interpolator = CommandInterpolator::new("false {out}").unwrap();
        let err = interpolator.interpolate(&solid(10), &solid(90), 0.5).unwrap_err();
        assert!(matches!(err, WorkerError::Inference(_)));
    }

    #[test]
    fn test_build_requires_command() {
        let config = WorkerConfig {
            interpolator: InterpolatorKind::Command,
            ..Default::default()
        };
        assert!(matches!(
            build_interpolator(&config),
            Err(WorkerError::ConfigError(_))
        ));
        assert_eq!(
            build_interpolator(&WorkerConfig::default()).unwrap().stage_name(),
            "Blend"
        );
    }
}

//! Worker configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::error::WorkerError;

/// Which interpolation backend the worker loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolatorKind {
    /// Linear cross-fade
    #[default]
    Blend,
    /// External model program (`WORKER_MODEL_COMMAND`)
    Command,
}

impl FromStr for InterpolatorKind {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blend" => Ok(Self::Blend),
            "command" => Ok(Self::Command),
            other => Err(WorkerError::config_error(format!(
                "unknown interpolator '{}' (expected blend or command)",
                other
            ))),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long one dequeue blocks before re-checking for shutdown
    pub block_timeout: Duration,
    /// Pause after a broker failure
    pub error_backoff: Duration,
    /// Frames wider than this are downscaled for inference
    pub max_width: u32,
    /// Frames taller than this are downscaled for inference
    pub max_height: u32,
    pub interpolator: InterpolatorKind,
    /// Argument template with `{a}`, `{b}`, `{t}` and `{out}` placeholders
    pub model_command: Option<String>,
    /// Retries when publishing a result hits a transport error
    pub publish_retries: u32,
    /// Consecutive broker failures logged before suppression
    pub max_logged_failures: u32,
    /// Serve Prometheus metrics on this port when set
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            block_timeout: Duration::from_secs(5),
            error_backoff: Duration::from_secs(5),
            max_width: 2048,
            max_height: 1080,
            interpolator: InterpolatorKind::Blend,
            model_command: None,
            publish_retries: 3,
            max_logged_failures: 3,
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    ///
    /// An unknown `WORKER_INTERPOLATOR` is a configuration error rather than
    /// a silent fallback.
    pub fn from_env() -> Result<Self, WorkerError> {
        let interpolator = match std::env::var("WORKER_INTERPOLATOR") {
            Ok(value) => value.parse()?,
            Err(_) => InterpolatorKind::default(),
        };

        Ok(Self {
            block_timeout: Duration::from_secs(
                std::env::var("WORKER_BLOCK_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            error_backoff: Duration::from_secs(
                std::env::var("WORKER_ERROR_BACKOFF_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            max_width: std::env::var("WORKER_MAX_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2048),
            max_height: std::env::var("WORKER_MAX_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1080),
            interpolator,
            model_command: std::env::var("WORKER_MODEL_COMMAND")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            publish_retries: std::env::var("WORKER_PUBLISH_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            max_logged_failures: 3,
            metrics_port: std::env::var("WORKER_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        })
    }
}

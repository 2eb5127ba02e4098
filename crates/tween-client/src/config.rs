//! Client configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

/// How a run's targets are turned into tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// One task per run carrying every time fraction
    #[default]
    Batched,
    /// One single-time task per scheduled step, each anchored on its
    /// nearest resolved neighbours
    Progressive,
}

impl FromStr for Strategy {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batched" => Ok(Self::Batched),
            "progressive" => Ok(Self::Progressive),
            other => Err(ClientError::validation(format!(
                "unknown strategy '{}' (expected batched or progressive)",
                other
            ))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batched => write!(f, "batched"),
            Self::Progressive => write!(f, "progressive"),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long to wait for each task's result
    pub result_timeout: Duration,
    pub strategy: Strategy,
    /// Kill ffmpeg after this many seconds
    pub ffmpeg_timeout: Option<u64>,
    /// Recompose each successful run into this directory
    pub output_dir: Option<PathBuf>,
    /// Container extension for per-run recompositions
    pub output_extension: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            result_timeout: Duration::from_secs(30),
            strategy: Strategy::Batched,
            ffmpeg_timeout: None,
            output_dir: None,
            output_extension: "mkv".to_string(),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> ClientResult<Self> {
        let strategy = match std::env::var("TWEEN_STRATEGY") {
            Ok(value) => value.parse()?,
            Err(_) => Strategy::default(),
        };

        Ok(Self {
            result_timeout: Duration::from_secs(
                std::env::var("TWEEN_RESULT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            strategy,
            ffmpeg_timeout: std::env::var("TWEEN_FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
            output_dir: std::env::var("TWEEN_OUTPUT_DIR").ok().map(PathBuf::from),
            output_extension: std::env::var("TWEEN_OUTPUT_EXTENSION")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "mkv".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("batched".parse::<Strategy>().unwrap(), Strategy::Batched);
        assert_eq!(" Progressive".parse::<Strategy>().unwrap(), Strategy::Progressive);
        assert!("greedy".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.strategy, Strategy::Batched);
        assert_eq!(config.result_timeout, Duration::from_secs(30));
        assert!(config.output_dir.is_none());
    }
}

//! Wire envelopes for tasks and results.

use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tween_models::TaskId;

use crate::codec::{decode_frame, encode_frame};
use crate::error::{QueueError, QueueResult};

/// Upper bound on the frames a single task may request.
pub const MAX_FRAMES_PER_TASK: usize = 1024;

/// Which intermediate frames a task asks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InterpolationRequest {
    /// Explicit fractions in the open interval (0, 1)
    Times { times: Vec<f64> },
    /// `num_frames` evenly spaced fractions
    Count { num_frames: u32 },
}

impl InterpolationRequest {
    /// The requested fractions, in output order.
    ///
    /// A count `N` expands to `i / (N + 1)` for `i = 1..=N`.
    pub fn times(&self) -> Vec<f64> {
        match self {
            InterpolationRequest::Times { times } => times.clone(),
            InterpolationRequest::Count { num_frames } => {
                let n = u64::from(*num_frames);
                (1..=n).map(|i| i as f64 / (n + 1) as f64).collect()
            }
        }
    }

    /// Number of frames the result must contain.
    pub fn len(&self) -> usize {
        match self {
            InterpolationRequest::Times { times } => times.len(),
            InterpolationRequest::Count { num_frames } => *num_frames as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> QueueResult<()> {
        match self {
            InterpolationRequest::Count { num_frames: 0 } => {
                Err(QueueError::validation("num_frames must be at least 1"))
            }
            InterpolationRequest::Count { num_frames } if *num_frames as usize > MAX_FRAMES_PER_TASK => {
                Err(QueueError::validation(format!(
                    "num_frames {} exceeds the limit of {}",
                    num_frames, MAX_FRAMES_PER_TASK
                )))
            }
            InterpolationRequest::Count { .. } => Ok(()),
            InterpolationRequest::Times { times } if times.is_empty() => {
                Err(QueueError::validation("times must not be empty"))
            }
            InterpolationRequest::Times { times } if times.len() > MAX_FRAMES_PER_TASK => {
                Err(QueueError::validation(format!(
                    "{} times exceed the limit of {}",
                    times.len(),
                    MAX_FRAMES_PER_TASK
                )))
            }
            InterpolationRequest::Times { times } => {
                match times.iter().find(|t| !(t.is_finite() && **t > 0.0 && **t < 1.0)) {
                    Some(t) => Err(QueueError::validation(format!(
                        "time {} is outside the open interval (0, 1)",
                        t
                    ))),
                    None => Ok(()),
                }
            }
        }
    }
}

/// A queued interpolation task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: TaskId,
    /// Left frame, PNG + base64
    pub frame_a: String,
    /// Right frame, PNG + base64
    pub frame_b: String,
    #[serde(flatten)]
    pub request: InterpolationRequest,
    #[serde(default = "Utc::now")]
    pub submitted_at: DateTime<Utc>,
}

impl TaskEnvelope {
    /// Validate the request and encode both rasters under a fresh task id.
    pub fn new(
        frame_a: &RgbImage,
        frame_b: &RgbImage,
        request: InterpolationRequest,
    ) -> QueueResult<Self> {
        request.validate()?;
        Ok(Self {
            task_id: TaskId::new(),
            frame_a: encode_frame(frame_a)?,
            frame_b: encode_frame(frame_b)?,
            request,
            submitted_at: Utc::now(),
        })
    }

    pub fn decode_frames(&self) -> QueueResult<(RgbImage, RgbImage)> {
        Ok((decode_frame(&self.frame_a)?, decode_frame(&self.frame_b)?))
    }

    /// Parse a raw payload, recovering the task id when the payload is
    /// JSON with a `task_id` but otherwise unusable.
    pub fn from_payload(payload: &str) -> QueueResult<Self> {
        serde_json::from_str(payload).map_err(|e| QueueError::MalformedTask {
            task_id: recover_task_id(payload),
            reason: e.to_string(),
        })
    }
}

pub(crate) fn recover_task_id(payload: &str) -> Option<TaskId> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    value
        .get("task_id")
        .and_then(|id| id.as_str())
        .map(TaskId::from_string)
}

/// What became of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskOutcome {
    /// Encoded frames in the order of the requested times
    Success { frames: Vec<String> },
    Failure { error: String },
    /// Withdrawn by an operator; workers skip the task
    Cancelled { cancelled_at: DateTime<Utc> },
}

/// A published result, keyed by task id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub task_id: TaskId,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
}

impl ResultEnvelope {
    pub fn success(task_id: TaskId, frames: &[RgbImage]) -> QueueResult<Self> {
        let frames = frames
            .iter()
            .map(encode_frame)
            .collect::<QueueResult<Vec<_>>>()?;
        Ok(Self {
            task_id,
            outcome: TaskOutcome::Success { frames },
        })
    }

    pub fn failure(task_id: TaskId, error: impl Into<String>) -> Self {
        Self {
            task_id,
            outcome: TaskOutcome::Failure {
                error: error.into(),
            },
        }
    }

    pub fn cancelled(task_id: TaskId) -> Self {
        Self {
            task_id,
            outcome: TaskOutcome::Cancelled {
                cancelled_at: Utc::now(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Success { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Cancelled { .. })
    }

    /// Decode the frames of a success result.
    pub fn decode_frames(&self) -> QueueResult<Vec<RgbImage>> {
        match &self.outcome {
            TaskOutcome::Success { frames } => frames.iter().map(|f| decode_frame(f)).collect(),
            TaskOutcome::Failure { error } => Err(QueueError::validation(format!(
                "result {} is a failure: {}",
                self.task_id, error
            ))),
            TaskOutcome::Cancelled { .. } => Err(QueueError::validation(format!(
                "result {} was cancelled",
                self.task_id
            ))),
        }
    }
}

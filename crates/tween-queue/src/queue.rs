//! Interpolation queue built on a [`Broker`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tween_models::TaskId;

use crate::broker::{Broker, MemoryBroker, RedisBroker};
use crate::envelope::{
    recover_task_id, InterpolationRequest, ResultEnvelope, TaskEnvelope, TaskOutcome,
};
use crate::error::QueueResult;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Key prefix for the task list and result slots
    pub prefix: String,
    /// How long a published result stays readable
    pub result_ttl: Duration,
    /// Result polling interval
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            prefix: "tween".to_string(),
            result_ttl: Duration::from_secs(3600),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            prefix: std::env::var("TWEEN_QUEUE_PREFIX").unwrap_or_else(|_| "tween".to_string()),
            result_ttl: Duration::from_secs(
                std::env::var("TWEEN_RESULT_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            poll_interval: Duration::from_millis(
                std::env::var("TWEEN_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(100),
            ),
        }
    }
}

/// Where a task stands, as far as the broker can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Still in the task list
    Queued,
    /// Not queued and no result: running, expired or never submitted
    Unknown,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether a result has been recorded for the task.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Unknown => "unknown",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

impl From<&TaskOutcome> for TaskStatus {
    fn from(outcome: &TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Success { .. } => TaskStatus::Succeeded,
            TaskOutcome::Failure { .. } => TaskStatus::Failed,
            TaskOutcome::Cancelled { .. } => TaskStatus::Cancelled,
        }
    }
}

/// Submits tasks, hands them to workers, and carries results back.
#[derive(Clone)]
pub struct InterpolationQueue {
    broker: Arc<dyn Broker>,
    config: QueueConfig,
}

impl InterpolationQueue {
    /// Create a Redis-backed queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let broker = RedisBroker::new(&config.redis_url, &config.prefix)?;
        Ok(Self::with_broker(Arc::new(broker), config))
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn with_broker(broker: Arc<dyn Broker>, config: QueueConfig) -> Self {
        Self { broker, config }
    }

    /// A queue backed by an in-process broker.
    pub fn in_memory() -> Self {
        Self::with_broker(Arc::new(MemoryBroker::new()), QueueConfig::default())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Encode both frames and enqueue a task. Invalid requests are rejected
    /// before anything is enqueued.
    pub async fn submit(
        &self,
        frame_a: &RgbImage,
        frame_b: &RgbImage,
        request: InterpolationRequest,
    ) -> QueueResult<TaskId> {
        let envelope = TaskEnvelope::new(frame_a, frame_b, request)?;
        let payload = serde_json::to_string(&envelope)?;
        self.broker.push_task(payload).await?;

        debug!(
            task_id = %envelope.task_id,
            frames = envelope.request.len(),
            "Submitted interpolation task"
        );
        Ok(envelope.task_id)
    }

    /// Block for the next task, up to `timeout` (forever when None).
    ///
    /// An undecodable payload is returned as [`crate::QueueError::MalformedTask`];
    /// it has already been removed from the queue.
    pub async fn next_task(&self, timeout: Option<Duration>) -> QueueResult<Option<TaskEnvelope>> {
        let Some(payload) = self.broker.pop_task(timeout).await? else {
            return Ok(None);
        };
        let envelope = TaskEnvelope::from_payload(&payload)?;
        debug!(task_id = %envelope.task_id, "Dequeued task");
        Ok(Some(envelope))
    }

    pub async fn publish_result(&self, result: &ResultEnvelope) -> QueueResult<()> {
        let payload = serde_json::to_string(result)?;
        self.broker
            .put_result(&result.task_id, payload, self.config.result_ttl)
            .await?;
        debug!(
            task_id = %result.task_id,
            success = result.is_success(),
            "Published result"
        );
        Ok(())
    }

    /// Read a result if one has been published. Reading does not consume it.
    pub async fn fetch_result(&self, task_id: &TaskId) -> QueueResult<Option<ResultEnvelope>> {
        match self.broker.get_result(task_id).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Poll for a result until `timeout` elapses.
    ///
    /// `Ok(None)` means the outcome is unknown; the task may still complete.
    pub async fn wait_for_result(
        &self,
        task_id: &TaskId,
        timeout: Duration,
    ) -> QueueResult<Option<ResultEnvelope>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(result) = self.fetch_result(task_id).await? {
                return Ok(Some(result));
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    task_id = %task_id,
                    waited_ms = timeout.as_millis() as u64,
                    "No result before deadline"
                );
                return Ok(None);
            }
            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    /// Number of queued tasks.
    pub async fn pending(&self) -> QueueResult<usize> {
        self.broker.pending().await
    }

    /// Drop every queued task.
    pub async fn purge(&self) -> QueueResult<usize> {
        let count = self.broker.purge().await?;
        info!("Purged {} queued tasks", count);
        Ok(count)
    }

    /// Ids of the queued tasks, next-to-run first. Payloads without a
    /// readable id are skipped.
    pub async fn queued_task_ids(&self) -> QueueResult<Vec<TaskId>> {
        Ok(self
            .broker
            .queued_tasks()
            .await?
            .iter()
            .filter_map(|payload| recover_task_id(payload))
            .collect())
    }

    pub async fn status(&self, task_id: &TaskId) -> QueueResult<TaskStatus> {
        if let Some(result) = self.fetch_result(task_id).await? {
            return Ok(TaskStatus::from(&result.outcome));
        }
        if self.queued_task_ids().await?.contains(task_id) {
            return Ok(TaskStatus::Queued);
        }
        Ok(TaskStatus::Unknown)
    }

    /// Whether the task's result slot holds a cancellation.
    pub async fn is_cancelled(&self, task_id: &TaskId) -> QueueResult<bool> {
        Ok(self
            .fetch_result(task_id)
            .await?
            .is_some_and(|result| result.is_cancelled()))
    }

    /// Withdraw a task. A queued task is removed from the list; a running
    /// one is marked so its worker drops the result.
    ///
    /// Returns the status the task had. A finished task is left untouched.
    pub async fn cancel(&self, task_id: &TaskId) -> QueueResult<TaskStatus> {
        if let Some(result) = self.fetch_result(task_id).await? {
            return Ok(TaskStatus::from(&result.outcome));
        }

        let mut status = TaskStatus::Unknown;
        for payload in self.broker.queued_tasks().await? {
            if recover_task_id(&payload).as_ref() == Some(task_id) {
                if self.broker.remove_task(&payload).await? {
                    status = TaskStatus::Queued;
                }
                break;
            }
        }

        self.publish_result(&ResultEnvelope::cancelled(task_id.clone()))
            .await?;
        info!(task_id = %task_id, previous = %status, "Cancelled task");
        Ok(status)
    }
}

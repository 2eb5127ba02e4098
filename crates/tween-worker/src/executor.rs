//! Serialized task executor.

use tokio::sync::watch;
use tracing::{error, info, Instrument};

use tween_models::TaskId;
use tween_queue::{
    InterpolationQueue, QueueError, QueueResult, ResultEnvelope, TaskEnvelope,
};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::inference::InferenceService;
use crate::logging::TaskLogger;
use crate::metrics;
use crate::retry::{retry_async, Backoff, BrokerHealth};

/// Consumes tasks one at a time and publishes a result for each.
pub struct TaskExecutor {
    config: WorkerConfig,
    queue: InterpolationQueue,
    inference: InferenceService,
    health: BrokerHealth,
}

impl TaskExecutor {
    pub fn new(config: WorkerConfig, queue: InterpolationQueue, inference: InferenceService) -> Self {
        let health = BrokerHealth::new(config.max_logged_failures);
        Self {
            config,
            queue,
            inference,
            health,
        }
    }

    /// Consume until `shutdown` flips to true.
    ///
    /// The flag is checked between dequeues. A pop in progress runs to the
    /// block timeout, so a task it takes is still answered before exit.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> WorkerResult<()> {
        info!(
            interpolator = %self.inference.stage_name(),
            "Starting task executor"
        );

        loop {
            if *shutdown.borrow_and_update() {
                info!("Shutdown signal received, stopping executor");
                break;
            }
            let next = self.queue.next_task(Some(self.config.block_timeout)).await;

            if let Err(e) = self.handle(next).await {
                metrics::record_queue_error();
                if self.health.record_error() {
                    error!("Error consuming tasks: {}", e);
                }
                tokio::select! {
                    _ = shutdown_requested(&mut shutdown) => break,
                    _ = tokio::time::sleep(self.config.error_backoff) => {}
                }
            }
        }

        self.inference.shutdown().await;
        info!("Task executor stopped");
        Ok(())
    }

    /// Wait up to the block timeout for one task and process it.
    ///
    /// Returns the id of the task answered, if any. Only broker failures are
    /// returned as errors; task failures become failure results.
    pub async fn process_next(&mut self) -> WorkerResult<Option<TaskId>> {
        let next = self.queue.next_task(Some(self.config.block_timeout)).await;
        self.handle(next).await
    }

    async fn handle(
        &mut self,
        next: QueueResult<Option<TaskEnvelope>>,
    ) -> WorkerResult<Option<TaskId>> {
        match next {
            Ok(Some(task)) => {
                self.health.record_ok();
                let task_id = task.task_id.clone();
                if self.queue.is_cancelled(&task_id).await? {
                    info!(task_id = %task_id, "Skipping cancelled task");
                    metrics::record_task_cancelled();
                    return Ok(Some(task_id));
                }
                let logger = TaskLogger::new(&task_id, task.request.len());
                let span = logger.create_span();
                self.execute(task, &logger).instrument(span).await?;
                Ok(Some(task_id))
            }
            Ok(None) => {
                self.health.record_ok();
                Ok(None)
            }
            Err(QueueError::MalformedTask { task_id, reason }) => {
                self.health.record_ok();
                metrics::record_task_failed("malformed");
                match task_id {
                    Some(task_id) => {
                        error!(task_id = %task_id, "Malformed task: {}", reason);
                        self.publish(&ResultEnvelope::failure(
                            task_id.clone(),
                            format!("malformed task: {}", reason),
                        ))
                        .await?;
                        Ok(Some(task_id))
                    }
                    None => {
                        error!("Dropped malformed task without id: {}", reason);
                        Ok(None)
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run one task and publish its result. Errors here are publish failures.
    async fn execute(&self, task: TaskEnvelope, logger: &TaskLogger) -> WorkerResult<()> {
        logger.log_start("interpolating");

        let result = match self.interpolate(&task, logger).await {
            Ok(frames) => match ResultEnvelope::success(task.task_id.clone(), &frames) {
                Ok(result) => {
                    logger.log_completion(&format!("{} frames", frames.len()));
                    metrics::record_task_completed(frames.len());
                    result
                }
                Err(e) => {
                    logger.log_error(&e.to_string());
                    metrics::record_task_failed("encode");
                    ResultEnvelope::failure(task.task_id.clone(), e.to_string())
                }
            },
            Err(e) => {
                logger.log_error(&e.to_string());
                metrics::record_task_failed(failure_reason(&e));
                ResultEnvelope::failure(task.task_id.clone(), e.to_string())
            }
        };

        // Cancelled while running
        if self.queue.is_cancelled(&task.task_id).await? {
            info!(task_id = %task.task_id, "Dropping result of cancelled task");
            metrics::record_task_cancelled();
            return Ok(());
        }
        self.publish(&result).await
    }

    async fn interpolate(
        &self,
        task: &TaskEnvelope,
        logger: &TaskLogger,
    ) -> WorkerResult<Vec<image::RgbImage>> {
        task.request.validate()?;
        let (frame_a, frame_b) = task.decode_frames()?;
        logger.log_progress(&format!(
            "decoded {}x{} frame pair",
            frame_a.width(),
            frame_a.height()
        ));
        let times = task.request.times();
        let expected = times.len();

        let frames = self.inference.interpolate(frame_a, frame_b, times).await?;
        if frames.len() != expected {
            return Err(WorkerError::inference(format!(
                "model produced {} frames, {} requested",
                frames.len(),
                expected
            )));
        }
        Ok(frames)
    }

    async fn publish(&self, result: &ResultEnvelope) -> WorkerResult<()> {
        let backoff = Backoff::with_retries(self.config.publish_retries);
        retry_async(&backoff, "publish_result", QueueError::is_retryable, || {
            self.queue.publish_result(result)
        })
            .await
            .map_err(|e| {
                error!(task_id = %result.task_id, "Result could not be published: {}", e);
                WorkerError::from(e)
            })
    }
}

fn failure_reason(error: &WorkerError) -> &'static str {
    match error {
        WorkerError::Inference(_) => "inference",
        WorkerError::Queue(QueueError::Validation(_)) => "validation",
        WorkerError::Queue(QueueError::Codec(_)) => "codec",
        WorkerError::ServiceUnavailable(_) => "unavailable",
        _ => "other",
    }
}

/// Resolves once the flag is set. Never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

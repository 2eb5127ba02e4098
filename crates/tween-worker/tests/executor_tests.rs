//! Executor behaviour against an in-memory queue.

use std::sync::Arc;
use std::time::Duration;

use image::{Rgb, RgbImage};
use tokio::sync::watch;
use tween_models::TaskId;
use tween_queue::{
    encode_frame, Broker, InterpolationQueue, InterpolationRequest, MemoryBroker, QueueConfig,
    ResultEnvelope, TaskEnvelope, TaskOutcome, TaskStatus,
};
use tween_worker::{
    BlendInterpolator, FrameInterpolator, FrameLimits, InferenceService, TaskExecutor,
    WorkerConfig, WorkerError, WorkerResult,
};

fn solid(value: u8) -> RgbImage {
    RgbImage::from_pixel(6, 4, Rgb([value, value, value]))
}

fn test_config() -> WorkerConfig {
    WorkerConfig {
        block_timeout: Duration::from_millis(50),
        error_backoff: Duration::from_millis(10),
        ..Default::default()
    }
}

fn executor_with(
    interpolator: Box<dyn FrameInterpolator>,
) -> (TaskExecutor, InterpolationQueue, Arc<MemoryBroker>) {
    let broker = Arc::new(MemoryBroker::new());
    let queue = InterpolationQueue::with_broker(broker.clone(), QueueConfig::default());
    let inference = InferenceService::spawn(interpolator, FrameLimits::default()).unwrap();
    let executor = TaskExecutor::new(test_config(), queue.clone(), inference);
    (executor, queue, broker)
}

/// Fails whenever the left frame is pure white.
struct RejectsWhite;

impl FrameInterpolator for RejectsWhite {
    fn interpolate(&mut self, a: &RgbImage, b: &RgbImage, t: f64) -> WorkerResult<RgbImage> {
        if a.get_pixel(0, 0).0 == [255, 255, 255] {
            return Err(WorkerError::inference("model rejected frame"));
        }
        BlendInterpolator.interpolate(a, b, t)
    }
}

#[tokio::test]
async fn test_failed_task_does_not_stop_the_next() {
    let (mut executor, queue, _) = executor_with(Box::new(RejectsWhite));

    let bad = queue
        .submit(&solid(255), &solid(0), InterpolationRequest::Count { num_frames: 1 })
        .await
        .unwrap();
    let good = queue
        .submit(&solid(0), &solid(100), InterpolationRequest::Count { num_frames: 1 })
        .await
        .unwrap();

    assert_eq!(executor.process_next().await.unwrap(), Some(bad.clone()));
    assert_eq!(executor.process_next().await.unwrap(), Some(good.clone()));

    let bad_result = queue.fetch_result(&bad).await.unwrap().unwrap();
    match bad_result.outcome {
        TaskOutcome::Failure { error } => assert!(error.contains("model rejected frame")),
        other => panic!("expected failure, got {other:?}"),
    }

    let good_result = queue.fetch_result(&good).await.unwrap().unwrap();
    assert_eq!(good_result.decode_frames().unwrap(), vec![solid(50)]);
}

#[tokio::test]
async fn test_corrupt_frame_gets_failure_result() {
    let (mut executor, queue, broker) = executor_with(Box::new(BlendInterpolator));

    let payload = serde_json::json!({
        "task_id": "task_corrupt",
        "frame_a": "bm90IGEgcG5n",
        "frame_b": encode_frame(&solid(1)).unwrap(),
        "times": [0.5]
    });
    broker.push_task(payload.to_string()).await.unwrap();
    let good = queue
        .submit(&solid(0), &solid(200), InterpolationRequest::Times { times: vec![0.5] })
        .await
        .unwrap();

    executor.process_next().await.unwrap();
    executor.process_next().await.unwrap();

    let corrupt = queue
        .fetch_result(&TaskId::from_string("task_corrupt"))
        .await
        .unwrap()
        .unwrap();
    assert!(!corrupt.is_success());
    assert!(queue.fetch_result(&good).await.unwrap().unwrap().is_success());
}

#[tokio::test]
async fn test_malformed_envelope_is_answered() {
    let (mut executor, queue, broker) = executor_with(Box::new(BlendInterpolator));
    broker
        .push_task(r#"{"task_id": "task_half", "frame_a": "AA=="}"#.to_string())
        .await
        .unwrap();

    let answered = executor.process_next().await.unwrap();
    assert_eq!(answered, Some(TaskId::from_string("task_half")));

    let result = queue
        .fetch_result(&TaskId::from_string("task_half"))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result.outcome, TaskOutcome::Failure { .. }));
}

#[tokio::test]
async fn test_invalid_times_bypassing_client_are_rejected() {
    let (mut executor, queue, broker) = executor_with(Box::new(BlendInterpolator));
    let payload = serde_json::json!({
        "task_id": "task_out_of_range",
        "frame_a": encode_frame(&solid(0)).unwrap(),
        "frame_b": encode_frame(&solid(9)).unwrap(),
        "times": [0.5, 1.0]
    });
    broker.push_task(payload.to_string()).await.unwrap();

    executor.process_next().await.unwrap();
    let result = queue
        .fetch_result(&TaskId::from_string("task_out_of_range"))
        .await
        .unwrap()
        .unwrap();
    assert!(!result.is_success());
}

#[tokio::test]
async fn test_empty_queue_returns_none() {
    let (mut executor, _, _) = executor_with(Box::new(BlendInterpolator));
    let answered = tokio_test::assert_ok!(executor.process_next().await);
    assert_eq!(answered, None);
}

#[tokio::test]
async fn test_run_until_shutdown() {
    let (executor, queue, _) = executor_with(Box::new(BlendInterpolator));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(executor.run(shutdown_rx));

    let task_id = queue
        .submit(&solid(10), &solid(30), InterpolationRequest::Count { num_frames: 3 })
        .await
        .unwrap();
    let result = queue
        .wait_for_result(&task_id, Duration::from_secs(5))
        .await
        .unwrap()
        .expect("worker should answer");
    assert_eq!(result.decode_frames().unwrap().len(), 3);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("executor should stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_oversized_count_is_refused_and_next_task_served() {
    let (mut executor, queue, broker) = executor_with(Box::new(BlendInterpolator));

    let payload = serde_json::json!({
        "task_id": "task_huge",
        "frame_a": encode_frame(&solid(0)).unwrap(),
        "frame_b": encode_frame(&solid(100)).unwrap(),
        "num_frames": u32::MAX
    });
    broker.push_task(payload.to_string()).await.unwrap();
    let good = queue
        .submit(&solid(0), &solid(100), InterpolationRequest::Count { num_frames: 1 })
        .await
        .unwrap();

    let huge = TaskId::from_string("task_huge");
    assert_eq!(executor.process_next().await.unwrap(), Some(huge.clone()));
    assert_eq!(executor.process_next().await.unwrap(), Some(good.clone()));

    match queue.fetch_result(&huge).await.unwrap().unwrap().outcome {
        TaskOutcome::Failure { error } => assert!(error.contains("exceeds the limit")),
        other => panic!("expected failure, got {other:?}"),
    }
    let good_result = queue.fetch_result(&good).await.unwrap().unwrap();
    assert_eq!(good_result.decode_frames().unwrap(), vec![solid(50)]);
}

#[tokio::test]
async fn test_cancelled_task_is_skipped() {
    let (mut executor, queue, broker) = executor_with(Box::new(BlendInterpolator));

    // Popped by a worker before the cancel removed it from the list
    let task = TaskEnvelope::new(
        &solid(0),
        &solid(100),
        InterpolationRequest::Count { num_frames: 1 },
    )
    .unwrap();
    let id = task.task_id.clone();
    queue
        .publish_result(&ResultEnvelope::cancelled(id.clone()))
        .await
        .unwrap();
    broker
        .push_task(serde_json::to_string(&task).unwrap())
        .await
        .unwrap();

    assert_eq!(executor.process_next().await.unwrap(), Some(id.clone()));
    assert_eq!(queue.status(&id).await.unwrap(), TaskStatus::Cancelled);
    assert!(queue.fetch_result(&id).await.unwrap().unwrap().is_cancelled());
}

#[tokio::test]
async fn test_task_taken_during_shutdown_is_answered() {
    let (executor, queue, _) = executor_with(Box::new(BlendInterpolator));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(executor.run(shutdown_rx));

    // Let the executor block on an empty queue
    tokio::time::sleep(Duration::from_millis(10)).await;
    shutdown_tx.send(true).unwrap();
    let task_id = queue
        .submit(&solid(10), &solid(30), InterpolationRequest::Count { num_frames: 1 })
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("executor should stop")
        .unwrap()
        .unwrap();

    // The task was either answered or left queued, never lost
    let answered = queue.fetch_result(&task_id).await.unwrap().is_some();
    let queued = queue.pending().await.unwrap() == 1;
    assert!(answered != queued);
}

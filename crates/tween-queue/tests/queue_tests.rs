//! Queue integration tests.
//!
//! The Redis tests run with: cargo test -p tween-queue -- --ignored

use std::time::Duration;

use image::{Rgb, RgbImage};
use tokio::time::Instant;
use tween_models::TaskId;
use tween_queue::{
    InterpolationQueue, InterpolationRequest, QueueConfig, ResultEnvelope, TaskStatus,
};

fn solid(value: u8) -> RgbImage {
    RgbImage::from_pixel(3, 2, Rgb([value, value / 2, 255 - value]))
}

/// A Redis-backed queue under a throwaway prefix.
fn redis_queue() -> InterpolationQueue {
    dotenvy::dotenv().ok();
    let config = QueueConfig {
        prefix: format!("tween-test-{}", uuid::Uuid::new_v4()),
        ..QueueConfig::from_env()
    };
    InterpolationQueue::new(config).expect("Failed to create queue")
}

#[tokio::test]
async fn test_wait_for_result_honours_timeout() {
    let queue = InterpolationQueue::in_memory();
    let started = Instant::now();

    let result = queue
        .wait_for_result(&TaskId::new(), Duration::from_secs(1))
        .await
        .unwrap();

    let elapsed = started.elapsed();
    assert!(result.is_none());
    assert!(elapsed >= Duration::from_secs(1), "returned early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "overshot: {:?}", elapsed);
}

#[tokio::test]
async fn test_results_are_keyed_by_task() {
    let queue = InterpolationQueue::in_memory();
    let first = queue
        .submit(&solid(0), &solid(10), InterpolationRequest::Count { num_frames: 1 })
        .await
        .unwrap();
    let second = queue
        .submit(&solid(20), &solid(30), InterpolationRequest::Count { num_frames: 1 })
        .await
        .unwrap();
    assert_ne!(first, second);

    // Publish out of order; each waiter still sees its own result
    queue
        .publish_result(&ResultEnvelope::failure(second.clone(), "second failed"))
        .await
        .unwrap();
    queue
        .publish_result(&ResultEnvelope::success(first.clone(), &[solid(5)]).unwrap())
        .await
        .unwrap();

    let a = tokio_test::assert_ok!(queue.fetch_result(&first).await).unwrap();
    let b = tokio_test::assert_ok!(queue.fetch_result(&second).await).unwrap();
    assert!(a.is_success());
    assert!(!b.is_success());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_roundtrip() {
    let queue = redis_queue();

    let task_id = queue
        .submit(
            &solid(0),
            &solid(200),
            InterpolationRequest::Times {
                times: vec![0.25, 0.75],
            },
        )
        .await
        .expect("Failed to submit");
    assert_eq!(queue.pending().await.unwrap(), 1);

    let task = queue
        .next_task(Some(Duration::from_secs(2)))
        .await
        .expect("Failed to pop")
        .expect("Task should be queued");
    assert_eq!(task.task_id, task_id);
    let (a, b) = task.decode_frames().unwrap();
    assert_eq!(a, solid(0));
    assert_eq!(b, solid(200));

    let frames = vec![solid(50), solid(150)];
    queue
        .publish_result(&ResultEnvelope::success(task_id.clone(), &frames).unwrap())
        .await
        .unwrap();

    let result = queue
        .wait_for_result(&task_id, Duration::from_secs(2))
        .await
        .unwrap()
        .expect("Result should be published");
    assert_eq!(result.decode_frames().unwrap(), frames);

    // Re-polling is idempotent
    assert!(queue.fetch_result(&task_id).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_pop_timeout_and_purge() {
    let queue = redis_queue();

    let started = Instant::now();
    let popped = queue
        .next_task(Some(Duration::from_millis(500)))
        .await
        .unwrap();
    assert!(popped.is_none());
    assert!(started.elapsed() >= Duration::from_millis(400));

    for _ in 0..3 {
        queue
            .submit(&solid(1), &solid(2), InterpolationRequest::Count { num_frames: 2 })
            .await
            .unwrap();
    }
    assert_eq!(queue.purge().await.unwrap(), 3);
    assert_eq!(queue.pending().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_wait_times_out_as_unknown() {
    let queue = redis_queue();
    let result = tokio_test::assert_ok!(
        queue
            .wait_for_result(&TaskId::new(), Duration::from_secs(1))
            .await
    );
    assert!(result.is_none());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_cancel_and_listing() {
    let queue = redis_queue();

    let keep = queue
        .submit(&solid(1), &solid(2), InterpolationRequest::Count { num_frames: 1 })
        .await
        .unwrap();
    let drop = queue
        .submit(&solid(3), &solid(4), InterpolationRequest::Count { num_frames: 1 })
        .await
        .unwrap();
    assert_eq!(
        queue.queued_task_ids().await.unwrap(),
        vec![keep.clone(), drop.clone()]
    );

    assert_eq!(queue.cancel(&drop).await.unwrap(), TaskStatus::Queued);
    assert_eq!(queue.status(&drop).await.unwrap(), TaskStatus::Cancelled);
    assert_eq!(queue.status(&keep).await.unwrap(), TaskStatus::Queued);
    assert_eq!(queue.pending().await.unwrap(), 1);

    queue.purge().await.unwrap();
}

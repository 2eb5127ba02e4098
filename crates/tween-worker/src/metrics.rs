//! Prometheus metrics for the worker.

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const TASKS_COMPLETED_TOTAL: &str = "tween_tasks_completed_total";
    pub const TASKS_FAILED_TOTAL: &str = "tween_tasks_failed_total";
    pub const TASKS_CANCELLED_TOTAL: &str = "tween_tasks_cancelled_total";
    pub const FRAMES_INTERPOLATED_TOTAL: &str = "tween_frames_interpolated_total";
    pub const INFERENCE_DURATION_SECONDS: &str = "tween_inference_duration_seconds";
    pub const QUEUE_ERRORS_TOTAL: &str = "tween_queue_errors_total";
}

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Record a task whose success result was published.
pub fn record_task_completed(frames: usize) {
    counter!(names::TASKS_COMPLETED_TOTAL).increment(1);
    counter!(names::FRAMES_INTERPOLATED_TOTAL).increment(frames as u64);
}

/// Record a task answered with a failure result.
pub fn record_task_failed(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::TASKS_FAILED_TOTAL, &labels).increment(1);
}

/// Record a cancelled task the worker dropped.
pub fn record_task_cancelled() {
    counter!(names::TASKS_CANCELLED_TOTAL).increment(1);
}

/// Record one model invocation.
pub fn record_inference(duration_secs: f64) {
    histogram!(names::INFERENCE_DURATION_SECONDS).record(duration_secs);
}

/// Record a broker failure in the consumption loop.
pub fn record_queue_error() {
    counter!(names::QUEUE_ERRORS_TOTAL).increment(1);
}

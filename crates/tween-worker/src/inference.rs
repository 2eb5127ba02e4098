//! Inference thread owning the frame interpolator.
//!
//! The interpolator is moved onto one dedicated OS thread; async code sends
//! it work over a channel and awaits the reply. Nothing else ever touches
//! the model.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::Instant;

use image::imageops::{self, FilterType};
use image::RgbImage;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::error::{WorkerError, WorkerResult};
use crate::interpolator::FrameInterpolator;
use crate::metrics;

/// Largest frame size handed to the model; bigger pairs are downscaled and
/// results restored to the source size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_width: 2048,
            max_height: 1080,
        }
    }
}

impl FrameLimits {
    /// Target size for `(width, height)`, keeping aspect ratio. None when
    /// the frame already fits.
    pub fn scaled_size(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        if width <= self.max_width && height <= self.max_height {
            return None;
        }
        let scale = (f64::from(self.max_width) / f64::from(width))
            .min(f64::from(self.max_height) / f64::from(height));
        let scaled_width = ((f64::from(width) * scale) as u32).max(1);
        let scaled_height = ((f64::from(height) * scale) as u32).max(1);
        Some((scaled_width, scaled_height))
    }
}

struct InferenceJob {
    frame_a: RgbImage,
    frame_b: RgbImage,
    times: Vec<f64>,
    reply: oneshot::Sender<WorkerResult<Vec<RgbImage>>>,
}

/// Handle to the inference thread.
pub struct InferenceService {
    jobs: Option<mpsc::Sender<InferenceJob>>,
    thread: Option<JoinHandle<()>>,
    stage_name: String,
}

impl InferenceService {
    /// Move `interpolator` onto a new inference thread.
    pub fn spawn(
        mut interpolator: Box<dyn FrameInterpolator>,
        limits: FrameLimits,
    ) -> WorkerResult<Self> {
        let stage_name = interpolator.stage_name().to_string();
        let (jobs, mut rx) = mpsc::channel::<InferenceJob>(1);

        let thread = std::thread::Builder::new()
            .name("tween-inference".to_string())
            .spawn(move || {
                info!("Inference thread started");
                while let Some(job) = rx.blocking_recv() {
                    let InferenceJob {
                        frame_a,
                        frame_b,
                        times,
                        reply,
                    } = job;

                    let outcome = catch_unwind(AssertUnwindSafe(|| {
                        run_job(interpolator.as_mut(), limits, &frame_a, &frame_b, &times)
                    }))
                    .unwrap_or_else(|_| {
                        error!("Interpolator panicked");
                        Err(WorkerError::inference("interpolator panicked"))
                    });

                    // The requester may have given up
                    let _ = reply.send(outcome);
                }
                info!("Inference thread stopped");
            })?;

        Ok(Self {
            jobs: Some(jobs),
            thread: Some(thread),
            stage_name,
        })
    }

    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Interpolate one frame per entry of `times`, in order.
    pub async fn interpolate(
        &self,
        frame_a: RgbImage,
        frame_b: RgbImage,
        times: Vec<f64>,
    ) -> WorkerResult<Vec<RgbImage>> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| WorkerError::service_unavailable("inference service stopped"))?;

        let (reply, response) = oneshot::channel();
        jobs.send(InferenceJob {
            frame_a,
            frame_b,
            times,
            reply,
        })
        .await
        .map_err(|_| WorkerError::service_unavailable("inference thread exited"))?;

        response
            .await
            .map_err(|_| WorkerError::service_unavailable("inference thread dropped the request"))?
    }

    /// Close the channel and wait for the thread to finish its current job.
    pub async fn shutdown(mut self) {
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            let joined = tokio::task::spawn_blocking(move || thread.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                error!("Inference thread did not exit cleanly");
            }
        }
    }
}

fn run_job(
    interpolator: &mut dyn FrameInterpolator,
    limits: FrameLimits,
    frame_a: &RgbImage,
    frame_b: &RgbImage,
    times: &[f64],
) -> WorkerResult<Vec<RgbImage>> {
    let (width, height) = frame_a.dimensions();
    if frame_b.dimensions() != (width, height) {
        return Err(WorkerError::inference(format!(
            "frame sizes differ: {}x{} vs {}x{}",
            width,
            height,
            frame_b.width(),
            frame_b.height()
        )));
    }

    let scaled = limits.scaled_size(width, height);
    let (model_a, model_b) = match scaled {
        Some((w, h)) => {
            debug!("Downscaling {}x{} to {}x{} for inference", width, height, w, h);
            (
                imageops::resize(frame_a, w, h, FilterType::Triangle),
                imageops::resize(frame_b, w, h, FilterType::Triangle),
            )
        }
        None => (frame_a.clone(), frame_b.clone()),
    };

    let mut frames = Vec::with_capacity(times.len());
    for &t in times {
        let started = Instant::now();
        let frame = interpolator.interpolate(&model_a, &model_b, t)?;
        metrics::record_inference(started.elapsed().as_secs_f64());

        if frame.dimensions() != model_a.dimensions() {
            return Err(WorkerError::inference(format!(
                "model returned {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                model_a.width(),
                model_a.height()
            )));
        }

        frames.push(match scaled {
            Some(_) => imageops::resize(&frame, width, height, FilterType::CatmullRom),
            None => frame,
        });
    }

    Ok(frames)
}

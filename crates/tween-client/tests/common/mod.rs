//! Scripted stand-in for the interpolation worker.

#![allow(dead_code)]

use std::time::Duration;

use image::{Rgb, RgbImage};
use tokio::task::JoinHandle;
use tween_queue::{InterpolationQueue, ResultEnvelope};

pub fn solid(value: u8) -> RgbImage {
    RgbImage::from_pixel(4, 4, Rgb([value, value, value]))
}

/// What the scripted worker answers with.
#[derive(Clone, Copy)]
pub enum Reply {
    Blend,
    Fail,
    OneFrameShort,
    Cancel,
}

pub fn blend(a: &RgbImage, b: &RgbImage, t: f64) -> RgbImage {
    let mut out = a.clone();
    for (o, (pa, pb)) in out.pixels_mut().zip(a.pixels().zip(b.pixels())) {
        for c in 0..3 {
            let v = f64::from(pa[c]) + (f64::from(pb[c]) - f64::from(pa[c])) * t;
            o[c] = v.round() as u8;
        }
    }
    out
}

pub fn spawn_worker(queue: InterpolationQueue, reply: Reply) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let task = match queue.next_task(Some(Duration::from_millis(20))).await {
                Ok(Some(task)) => task,
                Ok(None) => continue,
                Err(_) => return,
            };
            let (a, b) = task.decode_frames().unwrap();
            let mut frames: Vec<RgbImage> =
                task.request.times().iter().map(|t| blend(&a, &b, *t)).collect();
            let result = match reply {
                Reply::Blend => ResultEnvelope::success(task.task_id, &frames).unwrap(),
                Reply::Fail => ResultEnvelope::failure(task.task_id, "model exploded"),
                Reply::OneFrameShort => {
                    frames.pop();
                    ResultEnvelope::success(task.task_id, &frames).unwrap()
                }
                Reply::Cancel => ResultEnvelope::cancelled(task.task_id),
            };
            queue.publish_result(&result).await.unwrap();
        }
    })
}

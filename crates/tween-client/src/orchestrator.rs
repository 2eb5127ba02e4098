//! Client-side orchestration: turn requested positions into interpolation
//! tasks, commit the results and re-encode what changed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::Serialize;
use tracing::{debug, error, info};

use tween_media::{recompose_repository, FfmpegRunner, FrameSelection, Recomposition};
use tween_models::{Anchor, Generation, Position};
use tween_queue::{InterpolationQueue, InterpolationRequest, TaskOutcome, MAX_FRAMES_PER_TASK};
use tween_store::FrameStore;

use crate::config::{ClientConfig, Strategy};
use crate::error::{ClientError, ClientResult};
use crate::runs::{partition_runs, Run};
use crate::scheduler::{schedule, ScheduledStep};

/// What one successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub left: Position,
    pub right: Position,
    pub frames_written: usize,
    pub tasks_submitted: usize,
    pub recomposition: Option<Recomposition>,
}

/// Outcome of one contiguous run of targets.
#[derive(Debug)]
pub struct RunReport {
    pub first: Position,
    pub last: Position,
    pub outcome: ClientResult<RunSummary>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Drives interpolation for one frame repository.
pub struct Orchestrator {
    store: FrameStore,
    queue: InterpolationQueue,
    runner: FfmpegRunner,
    config: ClientConfig,
}

impl Orchestrator {
    pub fn new(store: FrameStore, queue: InterpolationQueue, config: ClientConfig) -> Self {
        let runner = match config.ffmpeg_timeout {
            Some(secs) => FfmpegRunner::new().with_timeout(secs),
            None => FfmpegRunner::new(),
        };
        Self {
            store,
            queue,
            runner,
            config,
        }
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Synthesize every target, one report per contiguous run.
    ///
    /// A failed run is reported and the remaining runs still proceed.
    pub async fn interpolate(&self, targets: &[Position]) -> ClientResult<Vec<RunReport>> {
        if targets.is_empty() {
            return Err(ClientError::validation("no target positions given"));
        }

        let committed = self.store.list().await?;
        let runs = partition_runs(&committed, targets);
        info!(
            targets = targets.len(),
            runs = runs.len(),
            strategy = %self.config.strategy,
            "Interpolating"
        );

        let mut reports = Vec::with_capacity(runs.len());
        for run in &runs {
            let outcome = self.process_run(run).await;
            match &outcome {
                Ok(summary) => info!(
                    first = %run.first(),
                    last = %run.last(),
                    frames = summary.frames_written,
                    tasks = summary.tasks_submitted,
                    "Run completed"
                ),
                Err(e) => error!(first = %run.first(), last = %run.last(), "Run failed: {}", e),
            }
            reports.push(RunReport {
                first: run.first(),
                last: run.last(),
                outcome,
            });
        }
        Ok(reports)
    }

    /// Re-encode the whole repository into `output`.
    pub async fn recompose_all(&self, output: impl AsRef<Path>) -> ClientResult<Recomposition> {
        Ok(recompose_repository(&self.store, FrameSelection::All, output, &self.runner).await?)
    }

    async fn process_run(&self, run: &Run) -> ClientResult<RunSummary> {
        let Some((left, right)) = run.bounds() else {
            return Err(ClientError::Unschedulable {
                targets: run.targets.clone(),
            });
        };
        let expected = self.current_generations(&run.targets).await?;

        let tasks_submitted = match self.config.strategy {
            Strategy::Batched => self.run_batched(run, left, right, &expected).await?,
            Strategy::Progressive => self.run_progressive(run, left, right, &expected).await?,
        };

        let recomposition = match &self.config.output_dir {
            Some(dir) => Some(self.recompose_range(dir, left, right).await?),
            None => None,
        };

        Ok(RunSummary {
            left,
            right,
            frames_written: run.targets.len(),
            tasks_submitted,
            recomposition,
        })
    }

    /// One task for the whole run, split when it exceeds the per-task limit.
    async fn run_batched(
        &self,
        run: &Run,
        left: Position,
        right: Position,
        expected: &HashMap<Position, Option<Generation>>,
    ) -> ClientResult<usize> {
        let frame_a = self.store.get(left).await?;
        let frame_b = self.store.get(right).await?;

        let mut tasks = 0;
        for targets in run.targets.chunks(MAX_FRAMES_PER_TASK) {
            let times = targets
                .iter()
                .map(|t| t.fraction_within(left, right))
                .collect();
            let frames = self
                .request(&frame_a, &frame_b, InterpolationRequest::Times { times })
                .await?;
            for (target, frame) in targets.iter().zip(&frames) {
                self.commit(*target, frame, expected).await?;
            }
            tasks += 1;
        }
        Ok(tasks)
    }

    /// One task per scheduled step, each on its nearest resolved neighbours.
    async fn run_progressive(
        &self,
        run: &Run,
        left: Position,
        right: Position,
        expected: &HashMap<Position, Option<Generation>>,
    ) -> ClientResult<usize> {
        let anchors = [self.anchor(left).await?, self.anchor(right).await?];
        let steps = schedule(&anchors, &run.targets)?;

        for step in &steps {
            debug!(%step, "Running scheduled step");
            let frame_a = self.store.get(step.left).await?;
            let frame_b = self.store.get(step.right).await?;
            let frames = self
                .request(
                    &frame_a,
                    &frame_b,
                    InterpolationRequest::Times {
                        times: vec![step.time()],
                    },
                )
                .await?;
            self.commit(step.target, &frames[0], expected).await?;
        }
        Ok(steps.len())
    }

    /// Submit one task and wait for its frames.
    async fn request(
        &self,
        frame_a: &RgbImage,
        frame_b: &RgbImage,
        request: InterpolationRequest,
    ) -> ClientResult<Vec<RgbImage>> {
        let requested = request.len();
        let task_id = self.queue.submit(frame_a, frame_b, request).await?;

        let waited = self.config.result_timeout;
        let Some(result) = self.queue.wait_for_result(&task_id, waited).await? else {
            return Err(ClientError::Timeout { task_id, waited });
        };

        match &result.outcome {
            TaskOutcome::Failure { error } => {
                return Err(ClientError::inference(task_id, error.clone()))
            }
            TaskOutcome::Cancelled { .. } => return Err(ClientError::Cancelled { task_id }),
            TaskOutcome::Success { .. } => {}
        }
        let frames = result.decode_frames()?;
        if frames.len() != requested {
            return Err(ClientError::inference(
                task_id,
                format!("requested {} frames, received {}", requested, frames.len()),
            ));
        }
        Ok(frames)
    }

    /// Write a synthesized frame unless someone else wrote it since the run began.
    async fn commit(
        &self,
        target: Position,
        frame: &RgbImage,
        expected: &HashMap<Position, Option<Generation>>,
    ) -> ClientResult<()> {
        let expected = expected.get(&target).copied().flatten();
        let generation = self.store.put_expecting(target, frame, expected).await?;
        debug!(position = %target, %generation, "Committed interpolated frame");
        Ok(())
    }

    async fn current_generations(
        &self,
        targets: &[Position],
    ) -> ClientResult<HashMap<Position, Option<Generation>>> {
        let mut generations = HashMap::with_capacity(targets.len());
        for target in targets {
            let record = self.store.record(*target).await?;
            generations.insert(*target, record.map(|r| r.generation));
        }
        Ok(generations)
    }

    async fn anchor(&self, position: Position) -> ClientResult<Anchor> {
        let generation = self
            .store
            .record(position)
            .await?
            .map(|r| r.generation)
            .unwrap_or(Generation::ORIGINAL);
        Ok(Anchor::new(position, generation))
    }

    async fn recompose_range(
        &self,
        dir: &Path,
        left: Position,
        right: Position,
    ) -> ClientResult<Recomposition> {
        let output = range_output(dir, left, right, &self.config.output_extension);
        let selection = FrameSelection::Range {
            first: left,
            last: right,
        };
        Ok(recompose_repository(&self.store, selection, &output, &self.runner).await?)
    }
}

/// Dry run: the steps that would synthesize `targets` from everything the
/// repository currently holds.
pub async fn plan(store: &FrameStore, targets: &[Position]) -> ClientResult<Vec<ScheduledStep>> {
    let anchors = store.anchors().await?;
    schedule(&anchors, targets)
}

/// `range_<left>_<right>.<ext>` inside `dir`.
pub fn range_output(dir: &Path, left: Position, right: Position, extension: &str) -> PathBuf {
    dir.join(format!("range_{}_{}.{}", left, right, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_output_name() {
        let path = range_output(
            Path::new("/out"),
            Position::from_frame(2),
            Position::from_frame(6),
            "mkv",
        );
        assert_eq!(
            path,
            PathBuf::from("/out/range_0000000002.000000_0000000006.000000.mkv")
        );
    }
}

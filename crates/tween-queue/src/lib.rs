//! Interpolation task queue.
//!
//! Tasks carry two PNG/base64 rasters and the requested time fractions.
//! Workers pop tasks from the head of a shared list; results are written to
//! a per-task slot that clients poll.

pub mod broker;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod queue;

pub use broker::{Broker, MemoryBroker, RedisBroker};
pub use codec::{decode_frame, encode_frame};
pub use envelope::{
    InterpolationRequest, ResultEnvelope, TaskEnvelope, TaskOutcome, MAX_FRAMES_PER_TASK,
};
pub use error::{QueueError, QueueResult};
pub use queue::{InterpolationQueue, QueueConfig, TaskStatus};

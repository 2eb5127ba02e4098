//! Client side of the tween pipeline.
//!
//! This crate provides:
//! - The dependency-ordered scheduler for interpolation targets
//! - Partitioning of targets into contiguous runs with bounding anchors
//! - An orchestrator that submits tasks, commits results and recomposes
//!   the affected ranges
//! - The `tween` command line

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod runs;
pub mod scheduler;

pub use config::{ClientConfig, Strategy};
pub use error::{ClientError, ClientResult};
pub use orchestrator::{plan, range_output, Orchestrator, RunReport, RunSummary};
pub use runs::{partition_runs, Run};
pub use scheduler::{schedule, ScheduledStep};

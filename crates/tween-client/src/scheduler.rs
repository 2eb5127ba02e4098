//! Dependency-ordered scheduling of interpolation targets.
//!
//! Given resolvable anchors and requested targets, produce the order in which
//! targets can be synthesized so that both endpoints of every step already
//! exist when the step runs. Each step splits the first open gap as close to
//! its middle as possible, so later frames are anchored on nearer neighbours.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tween_models::{Anchor, Generation, Position};

use crate::error::{ClientError, ClientResult};

/// One synthesis step: produce `target` from the frames at `left` and `right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduledStep {
    pub target: Position,
    pub left: Position,
    pub right: Position,
    /// Generation the target receives once written
    pub generation: Generation,
}

impl ScheduledStep {
    /// Fraction of the way from `left` to `right` the target sits at.
    pub fn time(&self) -> f64 {
        self.target.fraction_within(self.left, self.right)
    }
}

impl fmt::Display for ScheduledStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.target, self.left, self.right)
    }
}

/// Order `targets` for synthesis from `anchors`.
///
/// Anchors that are also targets are treated as unresolved. Fails with
/// [`ClientError::Unschedulable`] naming every target no pair of resolved
/// positions brackets.
pub fn schedule(anchors: &[Anchor], targets: &[Position]) -> ClientResult<Vec<ScheduledStep>> {
    let mut pending: BTreeSet<Position> = targets.iter().copied().collect();
    let mut resolved: BTreeMap<Position, Generation> = anchors
        .iter()
        .filter(|anchor| !pending.contains(&anchor.position))
        .map(|anchor| (anchor.position, anchor.generation))
        .collect();
    let mut generation = anchors
        .iter()
        .map(|anchor| anchor.generation)
        .max()
        .unwrap_or(Generation::ORIGINAL)
        .next();

    let mut steps = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let Some(step) = next_step(&resolved, &pending, generation) else {
            return Err(ClientError::Unschedulable {
                targets: pending.into_iter().collect(),
            });
        };
        pending.remove(&step.target);
        resolved.insert(step.target, step.generation);
        generation = generation.next();
        steps.push(step);
    }
    Ok(steps)
}

/// Pick the best target in the first gap that brackets any.
fn next_step(
    resolved: &BTreeMap<Position, Generation>,
    pending: &BTreeSet<Position>,
    generation: Generation,
) -> Option<ScheduledStep> {
    resolved
        .iter()
        .zip(resolved.iter().skip(1))
        .find_map(|((&left, &left_gen), (&right, &right_gen))| {
            let inside = pending.range(left..right).filter(|t| **t > left);
            let target = inside.min_by_key(|&&t| split_key(t, left, left_gen, right, right_gen))?;
            Some(ScheduledStep {
                target: *target,
                left,
                right,
                generation,
            })
        })
}

/// Ordering key: distance to the midpoint, then distance to the older
/// endpoint, then position.
fn split_key(
    target: Position,
    left: Position,
    left_gen: Generation,
    right: Position,
    right_gen: Generation,
) -> (u128, u64, Position) {
    let t = i128::from(target.ticks());
    let a = i128::from(left.ticks());
    let b = i128::from(right.ticks());
    let off_center = (2 * t - (a + b)).unsigned_abs();
    let bias = if left_gen <= right_gen {
        target.distance(left)
    } else {
        target.distance(right)
    };
    (off_center, bias, target)
}

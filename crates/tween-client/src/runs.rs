//! Partitioning of requested positions into contiguous runs.

use std::collections::BTreeSet;

use serde::Serialize;
use tween_models::Position;

/// A maximal group of targets with no committed non-target frame between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Run {
    /// Ascending, deduplicated
    pub targets: Vec<Position>,
    /// Nearest committed non-target below the first target
    pub left: Option<Position>,
    /// Nearest committed non-target above the last target
    pub right: Option<Position>,
}

impl Run {
    pub fn first(&self) -> Position {
        self.targets[0]
    }

    pub fn last(&self) -> Position {
        self.targets[self.targets.len() - 1]
    }

    /// Both bounding anchors, when the run is bracketed.
    pub fn bounds(&self) -> Option<(Position, Position)> {
        self.left.zip(self.right)
    }
}

/// Split `targets` into runs separated by committed frames.
///
/// Committed positions that are also targets count as targets: they are
/// rebuilt, not used as anchors.
pub fn partition_runs(committed: &[Position], targets: &[Position]) -> Vec<Run> {
    let targets: BTreeSet<Position> = targets.iter().copied().collect();
    let anchors: BTreeSet<Position> = committed
        .iter()
        .copied()
        .filter(|p| !targets.contains(p))
        .collect();

    let mut runs: Vec<Run> = Vec::new();
    let mut current: Vec<Position> = Vec::new();

    for target in targets {
        if let Some(&previous) = current.last() {
            if anchors.range(previous..target).next().is_some() {
                runs.push(close_run(&anchors, std::mem::take(&mut current)));
            }
        }
        current.push(target);
    }
    if !current.is_empty() {
        runs.push(close_run(&anchors, current));
    }
    runs
}

fn close_run(anchors: &BTreeSet<Position>, targets: Vec<Position>) -> Run {
    let first = targets[0];
    let last = targets[targets.len() - 1];
    Run {
        left: anchors.range(..first).next_back().copied(),
        right: anchors.range(last..).next().copied(),
        targets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(frame: u32) -> Position {
        Position::from_frame(frame)
    }

    fn frames(range: std::ops::RangeInclusive<u32>) -> Vec<Position> {
        range.map(p).collect()
    }

    #[test]
    fn test_missing_frames_form_one_run() {
        // 3..=5 dropped from a 0..=9 clip
        let committed: Vec<Position> = frames(0..=9)
            .into_iter()
            .filter(|f| !(p(3)..=p(5)).contains(f))
            .collect();
        let runs = partition_runs(&committed, &frames(3..=5));

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].targets, frames(3..=5));
        assert_eq!(runs[0].bounds(), Some((p(2), p(6))));
    }

    #[test]
    fn test_committed_frame_splits_runs() {
        let runs = partition_runs(&frames(0..=9), &[p(2), p(3), p(6)]);

        assert_eq!(runs.len(), 2);
        assert_eq!((runs[0].first(), runs[0].last()), (p(2), p(3)));
        assert_eq!(runs[0].bounds(), Some((p(1), p(4))));
        assert_eq!(runs[1].targets, vec![p(6)]);
        assert_eq!(runs[1].bounds(), Some((p(5), p(7))));
    }

    #[test]
    fn test_fractional_targets_between_neighbours() {
        let a = Position::from_f64(4.25).unwrap();
        let b = Position::from_f64(4.75).unwrap();
        let runs = partition_runs(&frames(0..=9), &[b, a]);

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].targets, vec![a, b]);
        assert_eq!(runs[0].bounds(), Some((p(4), p(5))));
    }

    #[test]
    fn test_edge_runs_lack_an_anchor() {
        let runs = partition_runs(&frames(0..=9), &[p(0), p(9), p(12)]);

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].left, None);
        assert_eq!(runs[0].right, Some(p(1)));
        assert_eq!(runs[1].targets, vec![p(9), p(12)]);
        assert_eq!(runs[1].left, Some(p(8)));
        assert_eq!(runs[1].bounds(), None);
    }

    #[test]
    fn test_duplicates_collapse() {
        let runs = partition_runs(&frames(0..=4), &[p(2), p(2)]);
        assert_eq!(runs[0].targets, vec![p(2)]);
    }

    #[test]
    fn test_no_targets_no_runs() {
        assert!(partition_runs(&frames(0..=4), &[]).is_empty());
    }
}

//! Undo/redo history rebuilt deterministically from a baseline snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LayoutModelError;
use crate::forest::Forest;
use crate::operation::{LayoutOperation, LayoutOperationError, LayoutOperationOutcome};
use crate::snapshot::ForestSnapshot;

/// One recorded edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub sequence: u64,
    pub operation_id: u64,
    pub operation: LayoutOperation,
    pub before_hash: u64,
    pub after_hash: u64,
}

/// Operation history with an undo/redo cursor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutTimeline {
    /// Forest before the first retained entry.
    pub baseline: Option<ForestSnapshot>,
    pub entries: Vec<TimelineEntry>,
    /// Number of entries currently applied (`<= entries.len()`).
    pub cursor: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    MissingBaseline,
    BaselineInvalid { source: LayoutModelError },
    ApplyFailed { source: LayoutOperationError },
    CursorOutOfRange { cursor: usize, entries: usize },
}

impl fmt::Display for TimelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBaseline => write!(f, "timeline baseline is not set"),
            Self::BaselineInvalid { source } => {
                write!(f, "failed to restore timeline baseline: {source}")
            }
            Self::ApplyFailed { source } => write!(f, "timeline replay operation failed: {source}"),
            Self::CursorOutOfRange { cursor, entries } => write!(
                f,
                "timeline cursor {cursor} is past the last of {entries} entries"
            ),
        }
    }
}

impl std::error::Error for TimelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BaselineInvalid { source } => Some(source),
            Self::ApplyFailed { source } => Some(source),
            Self::MissingBaseline | Self::CursorOutOfRange { .. } => None,
        }
    }
}

impl LayoutTimeline {
    #[must_use]
    pub fn with_baseline(forest: &Forest) -> Self {
        Self {
            baseline: Some(forest.to_snapshot()),
            entries: Vec::new(),
            cursor: 0,
        }
    }

    #[must_use]
    pub const fn applied_len(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Apply `operation` to `forest` and record it.
    ///
    /// Entries past the cursor (undone edits) are dropped first. A rejected
    /// operation records nothing.
    pub fn apply_and_record(
        &mut self,
        forest: &Forest,
        operation_id: u64,
        operation: LayoutOperation,
    ) -> Result<(Forest, LayoutOperationOutcome), LayoutOperationError> {
        let (next, outcome) = forest.apply_operation(operation_id, &operation)?;
        if self.baseline.is_none() {
            self.baseline = Some(forest.to_snapshot());
        }
        if self.cursor < self.entries.len() {
            tracing::debug!(
                dropped = self.entries.len() - self.cursor,
                "discarding redo branch"
            );
            self.entries.truncate(self.cursor);
        }
        let sequence = self
            .entries
            .last()
            .map_or(1, |entry| entry.sequence.saturating_add(1));
        self.entries.push(TimelineEntry {
            sequence,
            operation_id,
            operation,
            before_hash: outcome.before_hash,
            after_hash: outcome.after_hash,
        });
        self.cursor = self.entries.len();
        Ok((next, outcome))
    }

    /// Step back one entry. `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<Option<Forest>, TimelineError> {
        if self.cursor == 0 {
            return Ok(None);
        }
        self.cursor -= 1;
        self.replay().map(Some)
    }

    /// Re-apply one undone entry. `None` when there is nothing to redo.
    pub fn redo(&mut self) -> Result<Option<Forest>, TimelineError> {
        if self.cursor >= self.entries.len() {
            return Ok(None);
        }
        self.cursor += 1;
        self.replay().map(Some)
    }

    /// Rebuild the forest from the baseline and the applied entries.
    pub fn replay(&self) -> Result<Forest, TimelineError> {
        self.replay_prefix(self.cursor)
    }

    fn replay_prefix(&self, len: usize) -> Result<Forest, TimelineError> {
        if len > self.entries.len() {
            return Err(TimelineError::CursorOutOfRange {
                cursor: len,
                entries: self.entries.len(),
            });
        }
        let baseline = self
            .baseline
            .clone()
            .ok_or(TimelineError::MissingBaseline)?;
        let mut forest = Forest::from_snapshot(baseline)
            .map_err(|source| TimelineError::BaselineInvalid { source })?;
        for entry in self.entries.iter().take(len) {
            let (next, _) = forest
                .apply_operation(entry.operation_id, &entry.operation)
                .map_err(|source| TimelineError::ApplyFailed { source })?;
            forest = next;
        }
        Ok(forest)
    }

    /// Keep at most `max_entries` entries.
    ///
    /// The oldest applied entries are folded into the baseline; if that is
    /// not enough the redo tail is cut. Returns how many entries were
    /// folded.
    pub fn trim_to(&mut self, max_entries: usize) -> Result<usize, TimelineError> {
        let excess = self.entries.len().saturating_sub(max_entries);
        if excess == 0 {
            return Ok(0);
        }
        let folded = excess.min(self.cursor);
        if folded > 0 {
            let rebased = self.replay_prefix(folded)?;
            self.baseline = Some(rebased.to_snapshot());
            let _ = self.entries.drain(..folded);
            self.cursor -= folded;
        }
        self.entries.truncate(max_entries);
        tracing::debug!(folded, retained = self.entries.len(), "trimmed timeline");
        Ok(folded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{CellCoord, GridSpec, SplitAxis};
    use crate::id::NodeId;
    use crate::node::{Direction, LayoutNodeKind};

    fn id(raw: u64) -> NodeId {
        NodeId::new(raw).expect("test id must be non-zero")
    }

    fn seeded() -> (Forest, LayoutTimeline) {
        let (forest, _) = Forest::new()
            .add_root(LayoutNodeKind::workspace(Direction::Row))
            .expect("root");
        let (forest, _) = forest
            .add_child(
                id(1),
                LayoutNodeKind::grid(GridSpec::new(2, 2).expect("valid dimensions")),
            )
            .expect("grid");
        let timeline = LayoutTimeline::with_baseline(&forest);
        (forest, timeline)
    }

    fn split() -> LayoutOperation {
        LayoutOperation::SplitCell {
            grid: id(2),
            cell: CellCoord::new(1, 1),
            axis: SplitAxis::Vertical,
            count: 2,
        }
    }

    #[test]
    fn undo_and_redo_walk_the_history() {
        let (base, mut timeline) = seeded();
        let (one, _) = timeline
            .apply_and_record(&base, 1, split())
            .expect("split");
        let (two, _) = timeline
            .apply_and_record(&one, 2, LayoutOperation::InsertRow { grid: id(2), after: 2 })
            .expect("insert");
        assert_eq!(timeline.entries.len(), 2);
        assert_eq!(timeline.entries[1].sequence, 2);

        assert_eq!(timeline.undo().expect("undo"), Some(one.clone()));
        assert_eq!(timeline.undo().expect("undo"), Some(base.clone()));
        assert_eq!(timeline.undo().expect("undo"), None);
        assert_eq!(timeline.redo().expect("redo"), Some(one));
        assert_eq!(timeline.redo().expect("redo"), Some(two.clone()));
        assert_eq!(timeline.redo().expect("redo"), None);
        assert_eq!(timeline.replay().expect("replay"), two);
    }

    #[test]
    fn recording_after_undo_drops_redo_branch() {
        let (base, mut timeline) = seeded();
        let (one, _) = timeline
            .apply_and_record(&base, 1, split())
            .expect("split");
        let _ = timeline
            .apply_and_record(&one, 2, LayoutOperation::InsertRow { grid: id(2), after: 1 })
            .expect("insert");
        let undone = timeline.undo().expect("undo").expect("entry to undo");
        let _ = timeline
            .apply_and_record(&undone, 3, LayoutOperation::ChangeDirection { target: id(1) })
            .expect("flip");
        assert_eq!(timeline.entries.len(), 2);
        assert!(!timeline.can_redo());
        assert_eq!(timeline.entries[1].operation_id, 3);
    }

    #[test]
    fn rejected_operation_is_not_recorded() {
        let (base, mut timeline) = seeded();
        let err = timeline
            .apply_and_record(&base, 1, LayoutOperation::DeleteRow { grid: id(2), row: 9 })
            .expect_err("out of range");
        assert_eq!(err.operation_id, 1);
        assert!(timeline.entries.is_empty());
        assert!(!timeline.can_undo());
    }

    #[test]
    fn trim_folds_oldest_entries_into_baseline() {
        let (mut forest, mut timeline) = seeded();
        for operation_id in 1..=4 {
            let (next, _) = timeline
                .apply_and_record(
                    &forest,
                    operation_id,
                    LayoutOperation::ChangeDirection { target: id(1) },
                )
                .expect("flip");
            forest = next;
        }
        assert_eq!(timeline.trim_to(2).expect("trim"), 2);
        assert_eq!(timeline.entries.len(), 2);
        assert_eq!(timeline.cursor, 2);
        assert_eq!(timeline.replay().expect("replay"), forest);
        assert_eq!(timeline.entries[0].operation_id, 3);
    }

    #[test]
    fn trim_cuts_redo_tail_when_nothing_is_applied() {
        let (base, mut timeline) = seeded();
        let (one, _) = timeline
            .apply_and_record(&base, 1, split())
            .expect("split");
        let _ = timeline
            .apply_and_record(&one, 2, LayoutOperation::ChangeDirection { target: id(1) })
            .expect("flip");
        let _ = timeline.undo().expect("undo");
        let _ = timeline.undo().expect("undo");
        assert_eq!(timeline.trim_to(1).expect("trim"), 0);
        assert_eq!(timeline.entries.len(), 1);
        assert_eq!(timeline.replay().expect("replay"), base);
    }

    #[test]
    fn missing_baseline_is_reported() {
        let timeline = LayoutTimeline::default();
        assert_eq!(timeline.replay(), Err(TimelineError::MissingBaseline));
    }

    #[test]
    fn timeline_round_trips_through_json() {
        let (base, mut timeline) = seeded();
        let _ = timeline
            .apply_and_record(&base, 1, split())
            .expect("split");
        let json = serde_json::to_string(&timeline).expect("serialize");
        let back: LayoutTimeline = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, timeline);
        assert_eq!(
            back.replay().expect("replay"),
            timeline.replay().expect("replay")
        );
    }
}

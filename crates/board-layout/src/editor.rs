//! Stateful front door for UI edits: policy checks, history, persistence.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{GridError, LayoutModelError};
use crate::forest::Forest;
use crate::id::NodeId;
use crate::node::LayoutNodeKind;
use crate::operation::{
    LayoutOperation, LayoutOperationError, LayoutOperationKind, LayoutOperationOutcome,
};
use crate::policy::LayoutPolicy;
use crate::snapshot::{RepairError, RepairOutcome};
use crate::timeline::{LayoutTimeline, TimelineError};
use crate::workspace::{
    WORKSPACE_SCHEMA_VERSION, WorkspaceMetadata, WorkspaceSnapshot, WorkspaceValidationError,
};

#[derive(Debug)]
pub enum EditorError {
    /// The policy itself failed validation.
    InvalidPolicy(Vec<String>),
    /// The operation is legal for the model but outside the policy limits.
    PolicyViolation {
        kind: LayoutOperationKind,
        message: String,
    },
    Operation(LayoutOperationError),
    Timeline(TimelineError),
    Grid(GridError),
    Workspace(WorkspaceValidationError),
    /// Strict load rejected the layout (repair disabled by policy).
    Layout(LayoutModelError),
    Repair(RepairError),
}

impl fmt::Display for EditorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPolicy(errors) => write!(f, "invalid policy: {}", errors.join("; ")),
            Self::PolicyViolation { kind, message } => {
                write!(f, "{kind:?} rejected by policy: {message}")
            }
            Self::Operation(err) => write!(f, "{err}"),
            Self::Timeline(err) => write!(f, "{err}"),
            Self::Grid(err) => write!(f, "{err}"),
            Self::Workspace(err) => write!(f, "{err}"),
            Self::Layout(err) => write!(f, "layout rejected: {err}"),
            Self::Repair(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for EditorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Operation(err) => Some(err),
            Self::Timeline(err) => Some(err),
            Self::Grid(err) => Some(err),
            Self::Workspace(err) => Some(err),
            Self::Layout(err) => Some(err),
            Self::Repair(err) => Some(err),
            Self::InvalidPolicy(_) | Self::PolicyViolation { .. } => None,
        }
    }
}

impl From<LayoutOperationError> for EditorError {
    fn from(err: LayoutOperationError) -> Self {
        Self::Operation(err)
    }
}

impl From<TimelineError> for EditorError {
    fn from(err: TimelineError) -> Self {
        Self::Timeline(err)
    }
}

/// Owns the committed forest and its undo history.
///
/// Every edit goes through [`LayoutEditor::apply`]; the forest is only
/// replaced once an operation has been applied and validated.
#[derive(Debug, Clone)]
pub struct LayoutEditor {
    forest: Forest,
    timeline: LayoutTimeline,
    policy: LayoutPolicy,
    metadata: WorkspaceMetadata,
    extensions: BTreeMap<String, String>,
    next_operation_id: u64,
    load_repair: Option<RepairOutcome>,
}

impl LayoutEditor {
    /// Start an empty workspace.
    pub fn new(name: impl Into<String>, policy: LayoutPolicy) -> Result<Self, EditorError> {
        let policy = checked(policy)?;
        let forest = Forest::new();
        Ok(Self {
            timeline: LayoutTimeline::with_baseline(&forest),
            forest,
            policy,
            metadata: WorkspaceMetadata::new(name),
            extensions: BTreeMap::new(),
            next_operation_id: 1,
            load_repair: None,
        })
    }

    /// Open a persisted workspace.
    ///
    /// A damaged layout is repaired when the policy allows it; the history
    /// is then restarted from the repaired forest. A history that no
    /// longer replays to the stored layout is dropped as well.
    pub fn load(snapshot: WorkspaceSnapshot, policy: LayoutPolicy) -> Result<Self, EditorError> {
        let policy = checked(policy)?;
        if snapshot.schema_version != WORKSPACE_SCHEMA_VERSION {
            return Err(EditorError::Workspace(
                WorkspaceValidationError::UnsupportedVersion {
                    found: snapshot.schema_version,
                    expected: WORKSPACE_SCHEMA_VERSION,
                },
            ));
        }

        let (forest, load_repair) = match Forest::from_snapshot(snapshot.forest_snapshot()) {
            Ok(forest) => (forest, None),
            Err(err) if policy.load.repair_on_load => {
                tracing::warn!(error = %err, "layout failed validation, repairing");
                let outcome = Forest::from_snapshot_lenient(snapshot.forest_snapshot())
                    .map_err(EditorError::Repair)?;
                (outcome.forest.clone(), Some(outcome))
            }
            Err(err) => return Err(EditorError::Layout(err)),
        };

        let timeline = if load_repair.is_some() {
            LayoutTimeline::with_baseline(&forest)
        } else {
            restore_timeline(snapshot.timeline, &forest)
        };
        let next_operation_id = timeline
            .entries
            .iter()
            .map(|entry| entry.operation_id)
            .max()
            .map_or(1, |id| id.saturating_add(1));

        let mut editor = Self {
            forest,
            timeline,
            policy,
            metadata: snapshot.metadata,
            extensions: snapshot.extensions,
            next_operation_id,
            load_repair,
        };
        editor.trim_history()?;
        tracing::debug!(
            workspace = %editor.metadata.name,
            nodes = editor.forest.len(),
            history = editor.timeline.entries.len(),
            "workspace loaded"
        );
        Ok(editor)
    }

    #[must_use]
    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    #[must_use]
    pub fn policy(&self) -> &LayoutPolicy {
        &self.policy
    }

    #[must_use]
    pub fn metadata(&self) -> &WorkspaceMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn timeline(&self) -> &LayoutTimeline {
        &self.timeline
    }

    /// Repair performed by the last [`LayoutEditor::load`], if any.
    #[must_use]
    pub fn load_repair(&self) -> Option<&RepairOutcome> {
        self.load_repair.as_ref()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.timeline.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.timeline.can_redo()
    }

    /// Check against the policy, apply, record and commit one operation.
    pub fn apply(
        &mut self,
        operation: LayoutOperation,
    ) -> Result<LayoutOperationOutcome, EditorError> {
        self.check_policy(&operation)?;
        let operation_id = self.next_operation_id;
        self.next_operation_id = self.next_operation_id.saturating_add(1);
        let (next, outcome) =
            self.timeline
                .apply_and_record(&self.forest, operation_id, operation)?;
        self.forest = next;
        self.trim_history()?;
        Ok(outcome)
    }

    /// Add an empty grid shaped by the policy defaults under `parent`.
    pub fn add_grid(&mut self, parent: NodeId) -> Result<NodeId, EditorError> {
        let grid = self.policy.default_grid().map_err(EditorError::Grid)?;
        let id = self.forest.next_id();
        let _ = self.apply(LayoutOperation::AddChild {
            parent,
            node: LayoutNodeKind::grid(grid),
        })?;
        Ok(id)
    }

    /// Returns `false` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool, EditorError> {
        match self.timeline.undo()? {
            Some(forest) => {
                self.forest = forest;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns `false` when there is nothing to redo.
    pub fn redo(&mut self) -> Result<bool, EditorError> {
        match self.timeline.redo()? {
            Some(forest) => {
                self.forest = forest;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Snapshot the workspace for persistence and bump the save generation.
    pub fn save(&mut self) -> WorkspaceSnapshot {
        self.metadata.increment_generation();
        let mut snapshot = WorkspaceSnapshot::new(&self.forest, self.metadata.clone())
            .with_timeline(self.timeline.clone());
        snapshot.extensions = self.extensions.clone();
        snapshot.canonicalize();
        snapshot
    }

    fn check_policy(&self, operation: &LayoutOperation) -> Result<(), EditorError> {
        let violation = |message: String| EditorError::PolicyViolation {
            kind: operation.kind(),
            message,
        };
        match operation {
            LayoutOperation::SplitCell { count, .. } if *count > self.policy.grid.max_split_count => {
                Err(violation(format!(
                    "split into {count} exceeds max_split_count {}",
                    self.policy.grid.max_split_count
                )))
            }
            LayoutOperation::ChangeRowHeight { multiplier, .. }
                if *multiplier > self.policy.grid.max_row_height =>
            {
                Err(violation(format!(
                    "row height {multiplier} exceeds max_row_height {}",
                    self.policy.grid.max_row_height
                )))
            }
            _ => Ok(()),
        }
    }

    fn trim_history(&mut self) -> Result<(), EditorError> {
        let _ = self.timeline.trim_to(self.policy.history.max_entries)?;
        Ok(())
    }
}

fn checked(policy: LayoutPolicy) -> Result<LayoutPolicy, EditorError> {
    let errors = policy.validate();
    if errors.is_empty() {
        Ok(policy)
    } else {
        Err(EditorError::InvalidPolicy(errors))
    }
}

fn restore_timeline(timeline: LayoutTimeline, forest: &Forest) -> LayoutTimeline {
    match timeline.replay() {
        Ok(replayed) if replayed.state_hash() == forest.state_hash() => timeline,
        Ok(_) => {
            tracing::warn!("stored history does not match the layout, starting fresh");
            LayoutTimeline::with_baseline(forest)
        }
        Err(TimelineError::MissingBaseline) => LayoutTimeline::with_baseline(forest),
        Err(err) => {
            tracing::warn!(error = %err, "stored history failed to replay, starting fresh");
            LayoutTimeline::with_baseline(forest)
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::grid::{CellCoord, SplitAxis};
    use crate::node::Direction;

    fn editor_with_grid() -> (LayoutEditor, NodeId, NodeId) {
        let mut editor =
            LayoutEditor::new("ops", LayoutPolicy::default()).expect("default policy is valid");
        let root = editor
            .apply(LayoutOperation::AddRoot {
                node: LayoutNodeKind::workspace(Direction::Row),
            })
            .expect("root")
            .created
            .expect("root id");
        let grid = editor.add_grid(root).expect("grid");
        (editor, root, grid)
    }

    #[test]
    fn add_grid_uses_policy_defaults() {
        let mut policy = LayoutPolicy::default();
        policy.grid.default_rows = 3;
        policy.grid.default_row_unit = 40;
        let mut editor = LayoutEditor::new("ops", policy).expect("valid policy");
        let root = editor
            .apply(LayoutOperation::AddRoot {
                node: LayoutNodeKind::layout(Direction::Col),
            })
            .expect("root")
            .created
            .expect("root id");
        let grid_id = editor.add_grid(root).expect("grid");
        let grid = editor.forest().grid(grid_id).expect("grid node");
        assert_eq!((grid.rows, grid.cols, grid.row_unit), (3, 2, 40));
    }

    #[test]
    fn policy_limits_reject_before_applying() {
        let (mut editor, _, grid) = editor_with_grid();
        let mut policy = LayoutPolicy::default();
        policy.grid.max_split_count = 2;
        editor.policy = policy;
        let before = editor.forest().state_hash();

        let err = editor
            .apply(LayoutOperation::SplitCell {
                grid,
                cell: CellCoord::new(1, 1),
                axis: SplitAxis::Horizontal,
                count: 3,
            })
            .expect_err("over the split limit");
        assert!(matches!(err, EditorError::PolicyViolation { .. }));

        let err = editor
            .apply(LayoutOperation::ChangeRowHeight {
                grid,
                row: 1,
                multiplier: 4,
            })
            .expect_err("over the height limit");
        assert!(err.to_string().contains("max_row_height"));
        assert_eq!(editor.forest().state_hash(), before);
        assert_eq!(editor.timeline().entries.len(), 2);
    }

    #[test]
    fn undo_redo_restore_committed_forest() {
        let (mut editor, _, grid) = editor_with_grid();
        let before = editor.forest().clone();
        let _ = editor
            .apply(LayoutOperation::InsertColumn { grid, after: 2 })
            .expect("insert");
        let after = editor.forest().clone();
        assert_eq!(editor.forest().grid(grid).expect("grid").cols, 3);

        assert!(editor.undo().expect("undo"));
        assert_eq!(editor.forest(), &before);
        assert!(editor.redo().expect("redo"));
        assert_eq!(editor.forest(), &after);
        assert!(!editor.redo().expect("redo"));
    }

    #[test]
    fn failed_operation_keeps_state() {
        let (mut editor, root, grid) = editor_with_grid();
        let before = editor.forest().clone();
        let err = editor
            .apply(LayoutOperation::Reparent {
                target: root,
                new_parent: grid,
            })
            .expect_err("cycle");
        assert!(matches!(err, EditorError::Operation(_)));
        assert_eq!(editor.forest(), &before);
        assert_eq!(editor.timeline().entries.len(), 2);
    }

    #[test]
    fn history_is_capped_by_policy() {
        let mut policy = LayoutPolicy::default();
        policy.history.max_entries = 3;
        let mut editor = LayoutEditor::new("ops", policy).expect("valid policy");
        let root = editor
            .apply(LayoutOperation::AddRoot {
                node: LayoutNodeKind::workspace(Direction::Row),
            })
            .expect("root")
            .created
            .expect("root id");
        for _ in 0..5 {
            let _ = editor
                .apply(LayoutOperation::ChangeDirection { target: root })
                .expect("flip");
        }
        assert_eq!(editor.timeline().entries.len(), 3);
        let current = editor.forest().clone();
        assert_eq!(editor.timeline().replay().expect("replay"), current);
    }

    #[test]
    fn save_then_load_round_trips() {
        let (mut editor, _, grid) = editor_with_grid();
        let _ = editor
            .apply(LayoutOperation::PlaceInCell {
                grid,
                cell: CellCoord::new(1, 2),
                node: LayoutNodeKind::widget("chart"),
            })
            .expect("place");
        let saved = editor.save();
        assert_eq!(saved.metadata.saved_generation, 1);
        assert_eq!(saved.validate(), Ok(()));

        let json = saved.to_json().expect("serialize");
        let reloaded = WorkspaceSnapshot::from_json(&json).expect("parse");
        let mut restored = LayoutEditor::load(reloaded, LayoutPolicy::default()).expect("load");
        assert_eq!(restored.forest(), editor.forest());
        assert!(restored.load_repair().is_none());
        assert_eq!(restored.timeline().entries.len(), 3);

        assert!(restored.undo().expect("undo"));
        assert!(restored.forest().grid(grid).expect("grid").occupants().is_empty());
        let outcome = restored
            .apply(LayoutOperation::InsertRow { grid, after: 0 })
            .expect("insert");
        assert_eq!(outcome.operation_id, 4);
    }

    #[test]
    #[traced_test]
    fn damaged_layout_is_repaired_on_load() {
        let (mut editor, root, _) = editor_with_grid();
        let mut saved = editor.save();
        for node in &mut saved.layout {
            if node.id != root {
                node.parent = NodeId::new(99).ok();
            }
        }

        let editor = LayoutEditor::load(saved.clone(), LayoutPolicy::default()).expect("repaired");
        let repair = editor.load_repair().expect("repair happened");
        assert!(!repair.actions.is_empty());
        assert!(editor.forest().validate().is_ok());
        assert!(editor.timeline().entries.is_empty());
        assert!(logs_contain("repairing layout snapshot"));

        let mut strict = LayoutPolicy::default();
        strict.load.repair_on_load = false;
        assert!(matches!(
            LayoutEditor::load(saved, strict),
            Err(EditorError::Layout(LayoutModelError::MissingParent { .. }))
        ));
    }

    #[test]
    fn stale_history_is_dropped_on_load() {
        let (mut editor, _, grid) = editor_with_grid();
        let mut saved = editor.save();
        // Layout edited outside the editor.
        let forest = editor
            .forest()
            .insert_row(grid, 1)
            .expect("insert");
        saved.layout = forest.to_snapshot().nodes;

        let restored = LayoutEditor::load(saved, LayoutPolicy::default()).expect("load");
        assert_eq!(restored.forest(), &forest);
        assert!(restored.timeline().entries.is_empty());
        assert!(!restored.can_undo());
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let mut policy = LayoutPolicy::default();
        policy.grid.default_rows = 0;
        assert!(matches!(
            LayoutEditor::new("ops", policy),
            Err(EditorError::InvalidPolicy(errors)) if errors.len() == 1
        ));
    }
}

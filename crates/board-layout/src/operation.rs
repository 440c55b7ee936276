//! Layout mutations as data, atomic application and transactions.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutModelError};
use crate::forest::{Forest, ReorderDirection};
use crate::grid::{CellCoord, SplitAxis};
use crate::id::NodeId;
use crate::node::LayoutNodeKind;

/// Every structural edit the editor can record and replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum LayoutOperation {
    AddRoot {
        node: LayoutNodeKind,
    },
    AddChild {
        parent: NodeId,
        node: LayoutNodeKind,
    },
    /// Remove a subtree; with `vacate_cells` every cell holding a removed
    /// node is cleared as well.
    RemoveNode {
        target: NodeId,
        #[serde(default)]
        vacate_cells: bool,
    },
    Reparent {
        target: NodeId,
        new_parent: NodeId,
    },
    ChangeDirection {
        target: NodeId,
    },
    Reorder {
        target: NodeId,
        direction: ReorderDirection,
    },
    SetProvider {
        target: NodeId,
        slot: String,
        provider: Option<String>,
    },
    SplitCell {
        grid: NodeId,
        cell: CellCoord,
        axis: SplitAxis,
        count: u32,
    },
    MergeCells {
        grid: NodeId,
        cells: Vec<CellCoord>,
        keep: Option<NodeId>,
    },
    InsertRow {
        grid: NodeId,
        after: u32,
    },
    DeleteRow {
        grid: NodeId,
        row: u32,
    },
    InsertColumn {
        grid: NodeId,
        after: u32,
    },
    DeleteColumn {
        grid: NodeId,
        col: u32,
    },
    MoveOccupant {
        grid: NodeId,
        from: CellCoord,
        to: CellCoord,
    },
    ChangeRowHeight {
        grid: NodeId,
        row: u32,
        multiplier: u32,
    },
    PlaceInCell {
        grid: NodeId,
        cell: CellCoord,
        node: LayoutNodeKind,
    },
}

impl LayoutOperation {
    /// Operation family.
    #[must_use]
    pub const fn kind(&self) -> LayoutOperationKind {
        match self {
            Self::AddRoot { .. } => LayoutOperationKind::AddRoot,
            Self::AddChild { .. } => LayoutOperationKind::AddChild,
            Self::RemoveNode { .. } => LayoutOperationKind::RemoveNode,
            Self::Reparent { .. } => LayoutOperationKind::Reparent,
            Self::ChangeDirection { .. } => LayoutOperationKind::ChangeDirection,
            Self::Reorder { .. } => LayoutOperationKind::Reorder,
            Self::SetProvider { .. } => LayoutOperationKind::SetProvider,
            Self::SplitCell { .. } => LayoutOperationKind::SplitCell,
            Self::MergeCells { .. } => LayoutOperationKind::MergeCells,
            Self::InsertRow { .. } => LayoutOperationKind::InsertRow,
            Self::DeleteRow { .. } => LayoutOperationKind::DeleteRow,
            Self::InsertColumn { .. } => LayoutOperationKind::InsertColumn,
            Self::DeleteColumn { .. } => LayoutOperationKind::DeleteColumn,
            Self::MoveOccupant { .. } => LayoutOperationKind::MoveOccupant,
            Self::ChangeRowHeight { .. } => LayoutOperationKind::ChangeRowHeight,
            Self::PlaceInCell { .. } => LayoutOperationKind::PlaceInCell,
        }
    }

    #[must_use]
    fn referenced_nodes(&self) -> Vec<NodeId> {
        match self {
            Self::AddRoot { .. } => Vec::new(),
            Self::AddChild { parent, .. } => vec![*parent],
            Self::RemoveNode { target, .. }
            | Self::ChangeDirection { target }
            | Self::Reorder { target, .. }
            | Self::SetProvider { target, .. } => vec![*target],
            Self::Reparent { target, new_parent } => vec![*target, *new_parent],
            Self::MergeCells { grid, keep, .. } => std::iter::once(*grid).chain(*keep).collect(),
            Self::SplitCell { grid, .. }
            | Self::InsertRow { grid, .. }
            | Self::DeleteRow { grid, .. }
            | Self::InsertColumn { grid, .. }
            | Self::DeleteColumn { grid, .. }
            | Self::MoveOccupant { grid, .. }
            | Self::ChangeRowHeight { grid, .. }
            | Self::PlaceInCell { grid, .. } => vec![*grid],
        }
    }
}

/// Stable operation discriminator used in logs and journals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutOperationKind {
    AddRoot,
    AddChild,
    RemoveNode,
    Reparent,
    ChangeDirection,
    Reorder,
    SetProvider,
    SplitCell,
    MergeCells,
    InsertRow,
    DeleteRow,
    InsertColumn,
    DeleteColumn,
    MoveOccupant,
    ChangeRowHeight,
    PlaceInCell,
}

impl LayoutOperationKind {
    /// Whether the operation edits a grid's cell model.
    #[must_use]
    pub const fn is_grid_edit(self) -> bool {
        matches!(
            self,
            Self::SplitCell
                | Self::MergeCells
                | Self::InsertRow
                | Self::DeleteRow
                | Self::InsertColumn
                | Self::DeleteColumn
                | Self::MoveOccupant
                | Self::ChangeRowHeight
                | Self::PlaceInCell
        )
    }
}

/// Successful operation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutOperationOutcome {
    pub operation_id: u64,
    pub kind: LayoutOperationKind,
    pub touched_nodes: Vec<NodeId>,
    /// Node created by add/place operations.
    pub created: Option<NodeId>,
    pub before_hash: u64,
    pub after_hash: u64,
}

/// Why an operation was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutOperationFailure {
    Layout(LayoutError),
    /// The result broke a forest invariant.
    Validation(LayoutModelError),
}

impl fmt::Display for LayoutOperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layout(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "result failed validation: {err}"),
        }
    }
}

impl std::error::Error for LayoutOperationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Layout(err) => Some(err),
            Self::Validation(err) => Some(err),
        }
    }
}

/// Failure payload for operation APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutOperationError {
    pub operation_id: u64,
    pub kind: LayoutOperationKind,
    pub touched_nodes: Vec<NodeId>,
    pub before_hash: u64,
    pub reason: LayoutOperationFailure,
}

impl fmt::Display for LayoutOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "layout op {} ({:?}) failed: {} [nodes={:?}, before_hash={:#x}]",
            self.operation_id,
            self.kind,
            self.reason,
            self.touched_nodes
                .iter()
                .map(|node_id| node_id.get())
                .collect::<Vec<_>>(),
            self.before_hash,
        )
    }
}

impl std::error::Error for LayoutOperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.reason)
    }
}

impl Forest {
    /// Apply one operation and validate the result.
    ///
    /// `self` is never modified; the new forest is returned with the outcome.
    pub fn apply_operation(
        &self,
        operation_id: u64,
        operation: &LayoutOperation,
    ) -> Result<(Self, LayoutOperationOutcome), LayoutOperationError> {
        let kind = operation.kind();
        let span = tracing::debug_span!("layout.apply", op = ?kind, operation_id);
        let _guard = span.enter();

        let before_hash = self.state_hash();
        let mut touched: BTreeSet<NodeId> = operation.referenced_nodes().into_iter().collect();
        let reject = |touched: BTreeSet<NodeId>, reason: LayoutOperationFailure| {
            tracing::warn!(%reason, "layout operation rejected");
            LayoutOperationError {
                operation_id,
                kind,
                touched_nodes: touched.into_iter().collect(),
                before_hash,
                reason,
            }
        };

        let (next, created) = match self.apply_inner(operation) {
            Ok(applied) => applied,
            Err(err) => return Err(reject(touched, LayoutOperationFailure::Layout(err))),
        };
        if let Err(err) = next.validate() {
            return Err(reject(touched, LayoutOperationFailure::Validation(err)));
        }
        touched.extend(created);

        let after_hash = next.state_hash();
        tracing::debug!(before_hash, after_hash, "layout operation applied");
        Ok((
            next,
            LayoutOperationOutcome {
                operation_id,
                kind,
                touched_nodes: touched.into_iter().collect(),
                created,
                before_hash,
                after_hash,
            },
        ))
    }

    fn apply_inner(&self, operation: &LayoutOperation) -> Result<(Self, Option<NodeId>), LayoutError> {
        let unchanged = |forest: Self| -> (Self, Option<NodeId>) { (forest, None) };
        match operation {
            LayoutOperation::AddRoot { node } => {
                let (next, id) = self.add_root(node.clone())?;
                Ok((next, Some(id)))
            }
            LayoutOperation::AddChild { parent, node } => {
                let (next, id) = self.add_child(*parent, node.clone())?;
                Ok((next, Some(id)))
            }
            LayoutOperation::RemoveNode {
                target,
                vacate_cells,
            } => {
                if *vacate_cells {
                    self.remove_node_and_vacate(*target).map(unchanged)
                } else {
                    self.remove_node(*target).map(unchanged)
                }
            }
            LayoutOperation::Reparent { target, new_parent } => {
                self.reparent(*target, *new_parent).map(unchanged)
            }
            LayoutOperation::ChangeDirection { target } => {
                self.change_direction(*target).map(unchanged)
            }
            LayoutOperation::Reorder { target, direction } => {
                self.reorder(*target, *direction).map(unchanged)
            }
            LayoutOperation::SetProvider {
                target,
                slot,
                provider,
            } => self
                .set_selected_provider(*target, slot, provider.clone())
                .map(unchanged),
            LayoutOperation::SplitCell {
                grid,
                cell,
                axis,
                count,
            } => self.split_cell(*grid, *cell, *axis, *count).map(unchanged),
            LayoutOperation::MergeCells { grid, cells, keep } => {
                self.merge_cells(*grid, cells, *keep).map(unchanged)
            }
            LayoutOperation::InsertRow { grid, after } => {
                self.insert_row(*grid, *after).map(unchanged)
            }
            LayoutOperation::DeleteRow { grid, row } => self.delete_row(*grid, *row).map(unchanged),
            LayoutOperation::InsertColumn { grid, after } => {
                self.insert_column(*grid, *after).map(unchanged)
            }
            LayoutOperation::DeleteColumn { grid, col } => {
                self.delete_column(*grid, *col).map(unchanged)
            }
            LayoutOperation::MoveOccupant { grid, from, to } => {
                self.move_occupant(*grid, *from, *to).map(unchanged)
            }
            LayoutOperation::ChangeRowHeight {
                grid,
                row,
                multiplier,
            } => self
                .change_row_height(*grid, *row, *multiplier)
                .map(unchanged),
            LayoutOperation::PlaceInCell { grid, cell, node } => {
                let (next, id) = self.place_in_cell(*grid, *cell, node.clone())?;
                Ok((next, Some(id)))
            }
        }
    }

    /// Stage several operations against a working copy of this forest.
    #[must_use]
    pub fn begin_transaction(&self, transaction_id: u64) -> LayoutTransaction {
        LayoutTransaction::new(transaction_id, self.clone())
    }
}

/// One journal row per attempted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutJournalEntry {
    pub transaction_id: u64,
    pub sequence: u64,
    pub operation_id: u64,
    pub operation: LayoutOperation,
    pub kind: LayoutOperationKind,
    pub touched_nodes: Vec<NodeId>,
    pub before_hash: u64,
    pub after_hash: u64,
    pub result: LayoutJournalResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LayoutJournalResult {
    Applied,
    Rejected { reason: String },
}

/// Finalized transaction payload emitted by commit or rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutTransactionOutcome {
    pub transaction_id: u64,
    pub committed: bool,
    pub forest: Forest,
    pub journal: Vec<LayoutJournalEntry>,
}

/// Transaction boundary for a batch of layout edits.
///
/// Rejected operations are journaled but leave the working forest as it
/// was; `rollback` discards the applied ones too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutTransaction {
    transaction_id: u64,
    sequence: u64,
    base: Forest,
    working: Forest,
    journal: Vec<LayoutJournalEntry>,
}

impl LayoutTransaction {
    fn new(transaction_id: u64, base: Forest) -> Self {
        Self {
            transaction_id,
            sequence: 1,
            working: base.clone(),
            base,
            journal: Vec::new(),
        }
    }

    #[must_use]
    pub const fn transaction_id(&self) -> u64 {
        self.transaction_id
    }

    /// Current working forest.
    #[must_use]
    pub fn forest(&self) -> &Forest {
        &self.working
    }

    #[must_use]
    pub fn journal(&self) -> &[LayoutJournalEntry] {
        &self.journal
    }

    pub fn apply_operation(
        &mut self,
        operation_id: u64,
        operation: LayoutOperation,
    ) -> Result<LayoutOperationOutcome, LayoutOperationError> {
        let kind = operation.kind();
        let sequence = self.next_sequence();
        match self.working.apply_operation(operation_id, &operation) {
            Ok((next, outcome)) => {
                self.journal.push(LayoutJournalEntry {
                    transaction_id: self.transaction_id,
                    sequence,
                    operation_id,
                    operation,
                    kind,
                    touched_nodes: outcome.touched_nodes.clone(),
                    before_hash: outcome.before_hash,
                    after_hash: outcome.after_hash,
                    result: LayoutJournalResult::Applied,
                });
                self.working = next;
                Ok(outcome)
            }
            Err(err) => {
                self.journal.push(LayoutJournalEntry {
                    transaction_id: self.transaction_id,
                    sequence,
                    operation_id,
                    operation,
                    kind,
                    touched_nodes: err.touched_nodes.clone(),
                    before_hash: err.before_hash,
                    after_hash: err.before_hash,
                    result: LayoutJournalResult::Rejected {
                        reason: err.reason.to_string(),
                    },
                });
                Err(err)
            }
        }
    }

    /// Keep every applied operation.
    #[must_use]
    pub fn commit(self) -> LayoutTransactionOutcome {
        LayoutTransactionOutcome {
            transaction_id: self.transaction_id,
            committed: true,
            forest: self.working,
            journal: self.journal,
        }
    }

    /// Discard every applied operation.
    #[must_use]
    pub fn rollback(self) -> LayoutTransactionOutcome {
        LayoutTransactionOutcome {
            transaction_id: self.transaction_id,
            committed: false,
            forest: self.base,
            journal: self.journal,
        }
    }

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.sequence;
        self.sequence = self.sequence.saturating_add(1);
        sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvalidParentReason;
    use crate::grid::GridSpec;
    use crate::node::Direction;

    fn id(raw: u64) -> NodeId {
        NodeId::new(raw).expect("test id must be non-zero")
    }

    fn coord(row: u32, col: u32) -> CellCoord {
        CellCoord::new(row, col)
    }

    fn build(operations: &[LayoutOperation]) -> Forest {
        let mut forest = Forest::new();
        for (operation_id, operation) in (1u64..).zip(operations) {
            let (next, _) = forest
                .apply_operation(operation_id, operation)
                .expect("setup operation should apply");
            forest = next;
        }
        forest
    }

    fn dashboard() -> Forest {
        build(&[
            LayoutOperation::AddRoot {
                node: LayoutNodeKind::workspace(Direction::Row),
            },
            LayoutOperation::AddChild {
                parent: id(1),
                node: LayoutNodeKind::grid(GridSpec::new(2, 2).expect("valid dimensions")),
            },
            LayoutOperation::PlaceInCell {
                grid: id(2),
                cell: coord(1, 1),
                node: LayoutNodeKind::widget("chart"),
            },
        ])
    }

    #[test]
    fn outcome_reports_created_node_and_hashes() {
        let forest = dashboard();
        let operation = LayoutOperation::AddChild {
            parent: id(1),
            node: LayoutNodeKind::widget("text"),
        };
        let (next, outcome) = forest.apply_operation(7, &operation).expect("apply");
        assert_eq!(outcome.operation_id, 7);
        assert_eq!(outcome.kind, LayoutOperationKind::AddChild);
        assert_eq!(outcome.created, Some(id(4)));
        assert_eq!(outcome.touched_nodes, vec![id(1), id(4)]);
        assert_eq!(outcome.before_hash, forest.state_hash());
        assert_eq!(outcome.after_hash, next.state_hash());
        assert_ne!(outcome.before_hash, outcome.after_hash);
    }

    #[test]
    fn rejected_operation_carries_reason() {
        let forest = dashboard();
        let operation = LayoutOperation::Reparent {
            target: id(1),
            new_parent: id(3),
        };
        let err = forest.apply_operation(9, &operation).expect_err("cycle");
        assert_eq!(err.kind, LayoutOperationKind::Reparent);
        assert_eq!(err.touched_nodes, vec![id(1), id(3)]);
        assert_eq!(err.before_hash, forest.state_hash());
        assert!(matches!(
            err.reason,
            LayoutOperationFailure::Layout(LayoutError::CycleDetected { .. })
        ));
        assert!(err.to_string().contains("layout op 9"));
    }

    #[test]
    fn operations_round_trip_through_json() {
        let operation = LayoutOperation::MergeCells {
            grid: id(2),
            cells: vec![coord(1, 1), coord(1, 2)],
            keep: Some(id(3)),
        };
        let json = serde_json::to_value(&operation).expect("serialize");
        assert_eq!(json["op"], serde_json::json!("merge_cells"));
        assert_eq!(json["cells"], serde_json::json!(["1.1", "1.2"]));
        let back: LayoutOperation = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, operation);

        let place = LayoutOperation::PlaceInCell {
            grid: id(2),
            cell: coord(2, 1),
            node: LayoutNodeKind::widget("gauge"),
        };
        let json = serde_json::to_string(&place).expect("serialize");
        let back: LayoutOperation = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, place);
    }

    #[test]
    fn transaction_journals_every_attempt() {
        let forest = dashboard();
        let mut transaction = forest.begin_transaction(11);
        let applied = transaction
            .apply_operation(
                1,
                LayoutOperation::MergeCells {
                    grid: id(2),
                    cells: vec![coord(1, 1), coord(1, 2)],
                    keep: Some(id(3)),
                },
            )
            .expect("merge");
        let rejected = transaction
            .apply_operation(
                2,
                LayoutOperation::AddChild {
                    parent: id(3),
                    node: LayoutNodeKind::widget("nested"),
                },
            )
            .expect_err("widget parent");
        assert_eq!(
            rejected.reason,
            LayoutOperationFailure::Layout(LayoutError::InvalidParent {
                parent: id(3),
                reason: InvalidParentReason::WidgetParent,
            })
        );
        assert_eq!(transaction.forest().state_hash(), applied.after_hash);

        let journal = transaction.journal().to_vec();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal[0].sequence, 1);
        assert_eq!(journal[0].result, LayoutJournalResult::Applied);
        assert!(matches!(
            journal[1].result,
            LayoutJournalResult::Rejected { .. }
        ));

        let committed = transaction.clone().commit();
        assert!(committed.committed);
        assert_eq!(committed.forest.state_hash(), applied.after_hash);

        let rolled_back = transaction.rollback();
        assert!(!rolled_back.committed);
        assert_eq!(rolled_back.forest, forest);
        assert_eq!(rolled_back.journal, journal);
    }

    #[test]
    fn remove_node_with_vacate_clears_cells() {
        let forest = dashboard();
        let (next, _) = forest
            .apply_operation(
                1,
                &LayoutOperation::RemoveNode {
                    target: id(3),
                    vacate_cells: true,
                },
            )
            .expect("remove");
        assert!(next.grid(id(2)).expect("grid").occupants().is_empty());

        let (kept, _) = forest
            .apply_operation(
                2,
                &LayoutOperation::RemoveNode {
                    target: id(3),
                    vacate_cells: false,
                },
            )
            .expect("remove");
        assert_eq!(kept.grid(id(2)).expect("grid").find_occupant(id(3)), Some(coord(1, 1)));
    }
}

//! Error taxonomy for the layout forest and grid cell model.
//!
//! Every failure is recoverable: operations are pure, so the caller keeps
//! the previous snapshot and surfaces the structural reason.

use std::fmt;

use crate::grid::{CellCoord, CellRect, CellSpan, GridAxis};
use crate::id::NodeId;
use crate::snapshot::FOREST_SCHEMA_VERSION;

/// Structural defect found inside one grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridIssue {
    InvalidDimensions { rows: u32, cols: u32 },
    CellOutOfBounds { coord: CellCoord },
    RowHeightOutOfBounds { row: u32 },
    ZeroRowHeight { row: u32 },
    ZeroSpan { coord: CellCoord },
    SpanOutOfBounds { coord: CellCoord, span: CellSpan },
    /// A coordinate covered by a span is visible or covered twice.
    SpanOverlap { coord: CellCoord, owner: CellCoord },
    /// A hidden coordinate has no span owner.
    OrphanHiddenCell { coord: CellCoord },
    /// A hidden coordinate still carries an occupant or a span.
    HiddenCellPayload { coord: CellCoord },
}

impl fmt::Display for GridIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions { rows, cols } => {
                write!(f, "grid dimensions {rows}x{cols} must both be >= 1")
            }
            Self::CellOutOfBounds { coord } => write!(f, "cell {coord} lies outside the grid"),
            Self::RowHeightOutOfBounds { row } => {
                write!(f, "row height entry for row {row} lies outside the grid")
            }
            Self::ZeroRowHeight { row } => write!(f, "row {row} has a zero height multiplier"),
            Self::ZeroSpan { coord } => write!(f, "cell {coord} declares a zero span"),
            Self::SpanOutOfBounds { coord, span } => write!(
                f,
                "cell {coord} spans {}x{} past the grid edge",
                span.row, span.col
            ),
            Self::SpanOverlap { coord, owner } => write!(
                f,
                "cell {coord} is covered by the span of {owner} but is not a hidden slave"
            ),
            Self::OrphanHiddenCell { coord } => {
                write!(f, "hidden cell {coord} has no span owner")
            }
            Self::HiddenCellPayload { coord } => {
                write!(f, "hidden cell {coord} carries an occupant or span")
            }
        }
    }
}

/// Why a coordinate was rejected as an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidCellReason {
    /// The coordinate is covered by another cell's span.
    Hidden,
    /// The coordinate is hidden and no owner covers it.
    NoSpanOwner,
}

/// Why a split request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidSplitReason {
    /// Slave cells cannot be split; resolve to the span owner first.
    HiddenCell,
    CountOutOfRange { count: u32 },
}

/// Failures of grid cell operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    OutOfRange {
        axis: GridAxis,
        index: u32,
        len: u32,
    },
    InvalidCell {
        coord: CellCoord,
        reason: InvalidCellReason,
    },
    InvalidSplit {
        coord: CellCoord,
        reason: InvalidSplitReason,
    },
    NonRectangular {
        bounds: CellRect,
        selected: usize,
    },
    EmptySelection,
    LastRow {
        row: u32,
    },
    LastColumn {
        col: u32,
    },
    InvalidRowHeight {
        row: u32,
        multiplier: u32,
    },
    CellOccupied {
        coord: CellCoord,
        occupant: NodeId,
    },
    /// The occupant to keep after a merge already sits outside the selection.
    OccupantElsewhere {
        occupant: NodeId,
        coord: CellCoord,
    },
    InvalidDimensions {
        rows: u32,
        cols: u32,
    },
    Inconsistent(GridIssue),
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { axis, index, len } => {
                write!(f, "{axis} {index} is out of range (grid has {len})")
            }
            Self::InvalidCell { coord, reason } => match reason {
                InvalidCellReason::Hidden => write!(
                    f,
                    "cell {coord} is hidden by a span; target its span owner instead"
                ),
                InvalidCellReason::NoSpanOwner => {
                    write!(f, "hidden cell {coord} has no span owner")
                }
            },
            Self::InvalidSplit { coord, reason } => match reason {
                InvalidSplitReason::HiddenCell => {
                    write!(f, "cannot split hidden cell {coord}")
                }
                InvalidSplitReason::CountOutOfRange { count } => write!(
                    f,
                    "cannot split cell {coord} into {count} parts (supported: 2..=4)"
                ),
            },
            Self::NonRectangular { bounds, selected } => write!(
                f,
                "selection of {selected} cell(s) does not exactly cover rectangle {bounds}"
            ),
            Self::EmptySelection => write!(f, "selection is empty"),
            Self::LastRow { row } => {
                write!(f, "cannot delete row {row}: it is the last row with visible cells")
            }
            Self::LastColumn { col } => write!(
                f,
                "cannot delete column {col}: it is the last column with visible cells"
            ),
            Self::InvalidRowHeight { row, multiplier } => {
                write!(f, "row {row} height multiplier {multiplier} must be >= 1")
            }
            Self::CellOccupied { coord, occupant } => {
                write!(f, "cell {coord} is already occupied by node {occupant}")
            }
            Self::OccupantElsewhere { occupant, coord } => write!(
                f,
                "node {occupant} already occupies cell {coord} outside the selection"
            ),
            Self::InvalidDimensions { rows, cols } => {
                write!(f, "grid dimensions {rows}x{cols} must both be >= 1")
            }
            Self::Inconsistent(issue) => write!(f, "inconsistent grid: {issue}"),
        }
    }
}

impl std::error::Error for GridError {}

/// Why a node cannot be placed under a given parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidParentReason {
    Missing,
    /// Widgets never contain other nodes.
    WidgetParent,
}

/// Failures of forest-level operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    NotFound {
        node_id: NodeId,
    },
    InvalidParent {
        parent: NodeId,
        reason: InvalidParentReason,
    },
    CycleDetected {
        node_id: NodeId,
        new_parent: NodeId,
    },
    NotAGrid {
        node_id: NodeId,
    },
    NotAWidget {
        node_id: NodeId,
    },
    /// The node exists but is not a child of the grid being edited.
    NotInGrid {
        node_id: NodeId,
        grid: NodeId,
    },
    Grid {
        node_id: NodeId,
        source: GridError,
    },
    Model(LayoutModelError),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { node_id } => write!(f, "node {node_id} not found"),
            Self::InvalidParent { parent, reason } => match reason {
                InvalidParentReason::Missing => write!(f, "parent node {parent} does not exist"),
                InvalidParentReason::WidgetParent => {
                    write!(f, "node {parent} is a widget and cannot contain children")
                }
            },
            Self::CycleDetected {
                node_id,
                new_parent,
            } => write!(
                f,
                "moving node {node_id} under {new_parent} would create a cycle"
            ),
            Self::NotAGrid { node_id } => write!(f, "node {node_id} is not a grid"),
            Self::NotAWidget { node_id } => write!(f, "node {node_id} is not a widget"),
            Self::NotInGrid { node_id, grid } => {
                write!(f, "node {node_id} is not a child of grid {grid}")
            }
            Self::Grid { node_id, source } => write!(f, "grid {node_id}: {source}"),
            Self::Model(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LayoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Grid { source, .. } => Some(source),
            Self::Model(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LayoutModelError> for LayoutError {
    fn from(err: LayoutModelError) -> Self {
        Self::Model(err)
    }
}

/// Validation errors for forest construction from persisted data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutModelError {
    ZeroNodeId,
    NodeIdOverflow {
        current: NodeId,
    },
    UnsupportedSchemaVersion {
        version: u16,
    },
    DuplicateNodeId {
        node_id: NodeId,
    },
    MissingParent {
        node_id: NodeId,
        parent: NodeId,
    },
    CycleDetected {
        node_id: NodeId,
    },
    WidgetHasChildren {
        node_id: NodeId,
        child: NodeId,
    },
    DuplicateSiblingOrder {
        parent: Option<NodeId>,
        order: u32,
    },
    NextIdNotGreaterThanExisting {
        next_id: NodeId,
        max_existing: NodeId,
    },
    InvalidGrid {
        node_id: NodeId,
        issue: GridIssue,
    },
}

impl fmt::Display for LayoutModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroNodeId => write!(f, "node id 0 is reserved for the root sentinel"),
            Self::NodeIdOverflow { current } => write!(f, "node id overflow after {current}"),
            Self::UnsupportedSchemaVersion { version } => write!(
                f,
                "unsupported layout schema version {version} (expected {FOREST_SCHEMA_VERSION})"
            ),
            Self::DuplicateNodeId { node_id } => write!(f, "duplicate layout node id {node_id}"),
            Self::MissingParent { node_id, parent } => {
                write!(f, "node {node_id} references missing parent {parent}")
            }
            Self::CycleDetected { node_id } => write!(f, "cycle detected at node {node_id}"),
            Self::WidgetHasChildren { node_id, child } => {
                write!(f, "widget {node_id} has child {child}")
            }
            Self::DuplicateSiblingOrder { parent, order } => match parent {
                Some(parent) => write!(f, "children of node {parent} share order {order}"),
                None => write!(f, "top-level nodes share order {order}"),
            },
            Self::NextIdNotGreaterThanExisting {
                next_id,
                max_existing,
            } => write!(
                f,
                "next_id {next_id} must be greater than max existing id {max_existing}"
            ),
            Self::InvalidGrid { node_id, issue } => write!(f, "grid node {node_id}: {issue}"),
        }
    }
}

impl std::error::Error for LayoutModelError {}

#![forbid(unsafe_code)]

//! Board Layout
//!
//! Layout model for dashboard workspaces: a forest of layout nodes whose
//! leaves are widgets, plus a sparse cell model for grid-kind nodes.
//!
//! # Key Components
//!
//! - [`Forest`] - Validated node store with copy-on-write tree operations
//! - [`GridSpec`] - Sparse grid with spans, hidden cells and row heights
//! - [`LayoutOperation`] - Every mutation as serializable data
//! - [`LayoutTimeline`] - Undo/redo by deterministic replay
//! - [`ForestSnapshot`] - Persisted form with invariant reports and safe repair
//! - [`LayoutEditor`] - Policy-checked editing session over a workspace
//!
//! # Data flow
//! Every operation takes `&self` and returns a new value or an error, so a
//! caller always keeps the last good state. The editor layers policy checks
//! and history on top; persistence goes through [`WorkspaceSnapshot`].
//!
//! Logging uses `tracing`; the crate never installs a subscriber.

pub mod editor;
pub mod error;
pub mod forest;
pub mod grid;
pub mod id;
pub mod node;
pub mod operation;
pub mod policy;
pub mod snapshot;
pub mod timeline;
pub mod workspace;

pub use editor::{EditorError, LayoutEditor};
pub use error::{
    GridError, GridIssue, InvalidCellReason, InvalidParentReason, InvalidSplitReason,
    LayoutError, LayoutModelError,
};
pub use forest::{Forest, ReorderDirection};
pub use grid::{
    CellCoord, CellCoordParseError, CellDef, CellRect, CellSpan, GridAxis, GridRepair, GridSpec,
    SplitAxis, VisibleCell, is_rectangular_selection,
};
pub use id::{NodeId, NodeIdAllocator};
pub use node::{Direction, LayoutNode, LayoutNodeKind};
pub use operation::{
    LayoutJournalEntry, LayoutJournalResult, LayoutOperation, LayoutOperationError,
    LayoutOperationFailure, LayoutOperationKind, LayoutOperationOutcome, LayoutTransaction,
    LayoutTransactionOutcome,
};
pub use policy::{LayoutPolicy, PolicyConfigError};
pub use snapshot::{
    FOREST_SCHEMA_VERSION, ForestSnapshot, InvariantCode, InvariantIssue, InvariantReport,
    InvariantSeverity, RepairAction, RepairError, RepairFailure, RepairOutcome,
};
pub use timeline::{LayoutTimeline, TimelineEntry, TimelineError};
pub use workspace::{WorkspaceMetadata, WorkspaceSnapshot};

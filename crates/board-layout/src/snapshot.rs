//! Persisted forest shape, invariant diagnostics and safe repair.
//!
//! Loading is lenient: [`ForestSnapshot::invariant_report`] classifies every
//! defect and [`ForestSnapshot::repair_safe`] normalises the repairable ones
//! (re-rooting, dropping, unhiding) instead of failing the load. Defects
//! that cannot be repaired without guessing abort the repair untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::error::{GridIssue, LayoutModelError};
use crate::forest::Forest;
use crate::grid::{CellCoord, GridRepair};
use crate::id::NodeId;
use crate::node::{LayoutNode, LayoutNodeKind};

/// Current forest schema version.
pub const FOREST_SCHEMA_VERSION: u16 = 1;

fn default_schema_version() -> u16 {
    FOREST_SCHEMA_VERSION
}

/// Serialized layout forest: a flat node list plus the id allocator state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForestSnapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    #[serde(default)]
    pub next_id: NodeId,
    #[serde(rename = "layout", default)]
    pub nodes: Vec<LayoutNode>,
}

impl Default for ForestSnapshot {
    fn default() -> Self {
        Self {
            schema_version: FOREST_SCHEMA_VERSION,
            next_id: NodeId::MIN,
            nodes: Vec::new(),
        }
    }
}

impl ForestSnapshot {
    /// Sort nodes by id for deterministic serialization.
    pub fn canonicalize(&mut self) {
        self.nodes.sort_by_key(|node| node.id);
    }

    /// Order-independent structural hash.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut nodes: Vec<&LayoutNode> = self.nodes.iter().collect();
        nodes.sort_by_key(|node| node.id);
        layout_state_hash(self.schema_version, self.next_id, nodes)
    }

    #[must_use]
    pub fn invariant_report(&self) -> InvariantReport {
        build_invariant_report(self)
    }

    /// Repair every repairable defect and build a validated [`Forest`].
    ///
    /// Fails without touching anything if an unrepairable defect is present.
    pub fn repair_safe(self) -> Result<RepairOutcome, RepairError> {
        repair_snapshot_safe(self)
    }
}

pub(crate) fn layout_state_hash<'a>(
    schema_version: u16,
    next_id: NodeId,
    nodes: impl IntoIterator<Item = &'a LayoutNode>,
) -> u64 {
    let mut hasher = FxHasher::default();
    schema_version.hash(&mut hasher);
    next_id.hash(&mut hasher);
    for node in nodes {
        node.hash(&mut hasher);
    }
    hasher.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantSeverity {
    Error,
    Warning,
}

/// Stable code for one invariant finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantCode {
    UnsupportedSchemaVersion,
    ZeroNodeId,
    DuplicateNodeId,
    InvalidGridDimensions,
    NextIdNotGreaterThanExisting,
    MissingParent,
    CycleDetected,
    WidgetHasChildren,
    DuplicateSiblingOrder,
    CellOutOfBounds,
    RowHeightOutOfBounds,
    ZeroRowHeight,
    InvalidSpan,
    SpanOverlap,
    OrphanHiddenCell,
    HiddenCellPayload,
    DanglingOccupant,
}

impl InvariantCode {
    /// Whether [`ForestSnapshot::repair_safe`] can fix this without guessing.
    #[must_use]
    pub const fn is_repairable(self) -> bool {
        !matches!(
            self,
            Self::UnsupportedSchemaVersion
                | Self::ZeroNodeId
                | Self::DuplicateNodeId
                | Self::InvalidGridDimensions
        )
    }

    const fn severity(self) -> InvariantSeverity {
        match self {
            Self::DanglingOccupant => InvariantSeverity::Warning,
            _ => InvariantSeverity::Error,
        }
    }

    fn for_grid_issue(issue: GridIssue) -> Self {
        match issue {
            GridIssue::InvalidDimensions { .. } => Self::InvalidGridDimensions,
            GridIssue::CellOutOfBounds { .. } => Self::CellOutOfBounds,
            GridIssue::RowHeightOutOfBounds { .. } => Self::RowHeightOutOfBounds,
            GridIssue::ZeroRowHeight { .. } => Self::ZeroRowHeight,
            GridIssue::ZeroSpan { .. } | GridIssue::SpanOutOfBounds { .. } => Self::InvalidSpan,
            GridIssue::SpanOverlap { .. } => Self::SpanOverlap,
            GridIssue::OrphanHiddenCell { .. } => Self::OrphanHiddenCell,
            GridIssue::HiddenCellPayload { .. } => Self::HiddenCellPayload,
        }
    }
}

/// One actionable invariant finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantIssue {
    pub code: InvariantCode,
    pub severity: InvariantSeverity,
    pub repairable: bool,
    pub node_id: Option<NodeId>,
    pub related_node: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<CellCoord>,
    pub message: String,
}

/// Structured report over a forest snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantReport {
    pub snapshot_hash: u64,
    pub issues: Vec<InvariantIssue>,
}

impl InvariantReport {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.severity == InvariantSeverity::Error)
    }

    #[must_use]
    pub fn has_unrepairable_errors(&self) -> bool {
        self.issues.iter().any(|issue| !issue.repairable)
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Distinct codes, sorted.
    #[must_use]
    pub fn codes(&self) -> Vec<InvariantCode> {
        self.issues
            .iter()
            .map(|issue| issue.code)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// One deterministic repair step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RepairAction {
    ReparentNode {
        node_id: NodeId,
        before_parent: Option<NodeId>,
        after_parent: Option<NodeId>,
    },
    RenumberSiblings {
        parent: Option<NodeId>,
    },
    RepairGrid {
        node_id: NodeId,
        repair: GridRepair,
    },
    VacateDanglingOccupant {
        grid: NodeId,
        occupant: NodeId,
    },
    BumpNextId {
        before: NodeId,
        after: NodeId,
    },
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReparentNode {
                node_id,
                before_parent,
                after_parent,
            } => write!(
                f,
                "reparent node {node_id}: {} -> {}",
                before_parent.map_or(0, NodeId::get),
                after_parent.map_or(0, NodeId::get)
            ),
            Self::RenumberSiblings { parent } => write!(
                f,
                "renumber children of {}",
                parent.map_or(0, NodeId::get)
            ),
            Self::RepairGrid { node_id, repair } => write!(f, "repair grid {node_id}: {repair:?}"),
            Self::VacateDanglingOccupant { grid, occupant } => {
                write!(f, "vacate missing node {occupant} from grid {grid}")
            }
            Self::BumpNextId { before, after } => write!(f, "bump next_id {before} -> {after}"),
        }
    }
}

/// Result of a successful repair pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub before_hash: u64,
    pub after_hash: u64,
    pub report_before: InvariantReport,
    pub report_after: InvariantReport,
    pub actions: Vec<RepairAction>,
    pub forest: Forest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairFailure {
    UnsafeIssuesPresent { codes: Vec<InvariantCode> },
    ValidationFailed { error: LayoutModelError },
}

impl fmt::Display for RepairFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsafeIssuesPresent { codes } => {
                write!(f, "snapshot contains unrepairable issues: {codes:?}")
            }
            Self::ValidationFailed { error } => {
                write!(f, "repaired snapshot failed validation: {error}")
            }
        }
    }
}

impl std::error::Error for RepairFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Self::ValidationFailed { error } = self {
            return Some(error);
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairError {
    pub before_hash: u64,
    pub report: InvariantReport,
    pub reason: RepairFailure,
}

impl fmt::Display for RepairError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "layout repair failed: {} (before_hash={:#x}, issues={})",
            self.reason,
            self.before_hash,
            self.report.issues.len()
        )
    }
}

impl std::error::Error for RepairError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.reason)
    }
}

fn push_issue(
    issues: &mut Vec<InvariantIssue>,
    code: InvariantCode,
    node_id: Option<NodeId>,
    related_node: Option<NodeId>,
    cell: Option<CellCoord>,
    message: impl Into<String>,
) {
    issues.push(InvariantIssue {
        code,
        severity: code.severity(),
        repairable: code.is_repairable(),
        node_id,
        related_node,
        cell,
        message: message.into(),
    });
}

/// Members of every parent-pointer cycle, one sorted set per cycle.
fn find_cycles(nodes: &BTreeMap<NodeId, LayoutNode>) -> Vec<BTreeSet<NodeId>> {
    let mut settled: BTreeSet<NodeId> = BTreeSet::new();
    let mut cycles = Vec::new();
    for &start in nodes.keys() {
        let mut path: Vec<NodeId> = Vec::new();
        let mut cursor = Some(start);
        while let Some(current) = cursor {
            if settled.contains(&current) {
                break;
            }
            if let Some(position) = path.iter().position(|seen| *seen == current) {
                cycles.push(path[position..].iter().copied().collect());
                break;
            }
            path.push(current);
            cursor = nodes.get(&current).and_then(|node| node.parent);
        }
        settled.extend(path);
    }
    cycles
}

fn build_invariant_report(snapshot: &ForestSnapshot) -> InvariantReport {
    let mut issues = Vec::new();

    if snapshot.schema_version != FOREST_SCHEMA_VERSION {
        push_issue(
            &mut issues,
            InvariantCode::UnsupportedSchemaVersion,
            None,
            None,
            None,
            format!(
                "unsupported schema version {} (expected {FOREST_SCHEMA_VERSION})",
                snapshot.schema_version
            ),
        );
    }

    let mut nodes = BTreeMap::new();
    for node in &snapshot.nodes {
        if node.id.get() == 0 {
            push_issue(
                &mut issues,
                InvariantCode::ZeroNodeId,
                None,
                None,
                None,
                "node id 0 is reserved for the root sentinel",
            );
            continue;
        }
        if nodes.insert(node.id, node.clone()).is_some() {
            push_issue(
                &mut issues,
                InvariantCode::DuplicateNodeId,
                Some(node.id),
                None,
                None,
                format!("duplicate node id {}", node.id),
            );
        }
    }

    if let Some(max_existing) = nodes.keys().next_back().copied()
        && snapshot.next_id <= max_existing
    {
        push_issue(
            &mut issues,
            InvariantCode::NextIdNotGreaterThanExisting,
            Some(snapshot.next_id),
            Some(max_existing),
            None,
            format!(
                "next_id {} must be greater than max node id {max_existing}",
                snapshot.next_id
            ),
        );
    }

    let mut orders: BTreeMap<(Option<NodeId>, u32), NodeId> = BTreeMap::new();
    for node in nodes.values() {
        if let Some(parent) = node.parent {
            match nodes.get(&parent) {
                None => push_issue(
                    &mut issues,
                    InvariantCode::MissingParent,
                    Some(node.id),
                    Some(parent),
                    None,
                    format!("node {} references missing parent {parent}", node.id),
                ),
                Some(parent_node) if !parent_node.kind.is_container() => push_issue(
                    &mut issues,
                    InvariantCode::WidgetHasChildren,
                    Some(parent),
                    Some(node.id),
                    None,
                    format!("widget {parent} has child {}", node.id),
                ),
                Some(_) => {}
            }
        }

        if let Some(first) = orders.insert((node.parent, node.order), node.id) {
            push_issue(
                &mut issues,
                InvariantCode::DuplicateSiblingOrder,
                Some(node.id),
                Some(first),
                None,
                format!(
                    "nodes {first} and {} share sibling order {}",
                    node.id, node.order
                ),
            );
        }

        if let LayoutNodeKind::Grid { grid } = &node.kind {
            for issue in grid.consistency_issues() {
                let cell = match issue {
                    GridIssue::CellOutOfBounds { coord }
                    | GridIssue::ZeroSpan { coord }
                    | GridIssue::SpanOutOfBounds { coord, .. }
                    | GridIssue::SpanOverlap { coord, .. }
                    | GridIssue::OrphanHiddenCell { coord }
                    | GridIssue::HiddenCellPayload { coord } => Some(coord),
                    GridIssue::InvalidDimensions { .. }
                    | GridIssue::RowHeightOutOfBounds { .. }
                    | GridIssue::ZeroRowHeight { .. } => None,
                };
                push_issue(
                    &mut issues,
                    InvariantCode::for_grid_issue(issue),
                    Some(node.id),
                    None,
                    cell,
                    issue.to_string(),
                );
            }
            for occupant in grid.occupants() {
                if !nodes.contains_key(&occupant) {
                    push_issue(
                        &mut issues,
                        InvariantCode::DanglingOccupant,
                        Some(node.id),
                        Some(occupant),
                        grid.find_occupant(occupant),
                        format!("grid {} references missing node {occupant}", node.id),
                    );
                }
            }
        }
    }

    for cycle in find_cycles(&nodes) {
        let mut members = cycle.iter();
        let first = members.next().copied();
        push_issue(
            &mut issues,
            InvariantCode::CycleDetected,
            first,
            members.next().copied(),
            None,
            format!(
                "parent cycle through nodes {:?}",
                cycle.iter().map(|id| id.get()).collect::<Vec<_>>()
            ),
        );
    }

    issues.sort_by(|left, right| {
        (
            left.code,
            left.node_id.is_none(),
            left.node_id,
            left.related_node.is_none(),
            left.related_node,
            left.cell,
            &left.message,
        )
            .cmp(&(
                right.code,
                right.node_id.is_none(),
                right.node_id,
                right.related_node.is_none(),
                right.related_node,
                right.cell,
                &right.message,
            ))
    });

    InvariantReport {
        snapshot_hash: snapshot.state_hash(),
        issues,
    }
}

fn record(actions: &mut Vec<RepairAction>, action: RepairAction) {
    tracing::warn!(action = %action, "repairing layout snapshot");
    actions.push(action);
}

fn reparent(
    nodes: &mut BTreeMap<NodeId, LayoutNode>,
    actions: &mut Vec<RepairAction>,
    node_id: NodeId,
    after_parent: Option<NodeId>,
) {
    if let Some(node) = nodes.get_mut(&node_id) {
        let before_parent = node.parent;
        node.parent = after_parent;
        record(
            actions,
            RepairAction::ReparentNode {
                node_id,
                before_parent,
                after_parent,
            },
        );
    }
}

fn repair_snapshot_safe(mut snapshot: ForestSnapshot) -> Result<RepairOutcome, RepairError> {
    snapshot.canonicalize();

    let before_hash = snapshot.state_hash();
    let report_before = build_invariant_report(&snapshot);
    let unsafe_codes: Vec<InvariantCode> = report_before
        .issues
        .iter()
        .filter(|issue| !issue.repairable)
        .map(|issue| issue.code)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !unsafe_codes.is_empty() {
        return Err(RepairError {
            before_hash,
            report: report_before,
            reason: RepairFailure::UnsafeIssuesPresent {
                codes: unsafe_codes,
            },
        });
    }

    let mut nodes: BTreeMap<NodeId, LayoutNode> = snapshot
        .nodes
        .into_iter()
        .map(|node| (node.id, node))
        .collect();
    let mut actions = Vec::new();

    let orphans: Vec<NodeId> = nodes
        .values()
        .filter(|node| node.parent.is_some_and(|parent| !nodes.contains_key(&parent)))
        .map(|node| node.id)
        .collect();
    for node_id in orphans {
        reparent(&mut nodes, &mut actions, node_id, None);
    }

    for cycle in find_cycles(&nodes) {
        if let Some(&anchor) = cycle.first() {
            reparent(&mut nodes, &mut actions, anchor, None);
        }
    }

    // Hoist children of widgets until every parent is a container. Each
    // pass moves them one level up, so the loop ends within the depth.
    for _ in 0..=nodes.len() {
        let hoisted: Vec<(NodeId, Option<NodeId>)> = nodes
            .values()
            .filter_map(|node| {
                let parent = nodes.get(&node.parent?)?;
                (!parent.kind.is_container()).then_some((node.id, parent.parent))
            })
            .collect();
        if hoisted.is_empty() {
            break;
        }
        for (node_id, grandparent) in hoisted {
            reparent(&mut nodes, &mut actions, node_id, grandparent);
        }
    }

    let mut seen_orders: BTreeSet<(Option<NodeId>, u32)> = BTreeSet::new();
    let mut crowded: BTreeSet<Option<NodeId>> = BTreeSet::new();
    for node in nodes.values() {
        if !seen_orders.insert((node.parent, node.order)) {
            let _ = crowded.insert(node.parent);
        }
    }
    for parent in crowded {
        let mut siblings: Vec<(u32, NodeId)> = nodes
            .values()
            .filter(|node| node.parent == parent)
            .map(|node| (node.order, node.id))
            .collect();
        siblings.sort_unstable();
        for (rank, (_, node_id)) in (1u32..).zip(siblings) {
            if let Some(node) = nodes.get_mut(&node_id) {
                node.order = rank;
            }
        }
        record(&mut actions, RepairAction::RenumberSiblings { parent });
    }

    let existing: BTreeSet<NodeId> = nodes.keys().copied().collect();
    for node in nodes.values_mut() {
        let node_id = node.id;
        if let LayoutNodeKind::Grid { grid } = &mut node.kind {
            let (mut repaired, grid_actions) = grid.repaired();
            for repair in grid_actions {
                record(&mut actions, RepairAction::RepairGrid { node_id, repair });
            }
            for occupant in repaired.occupants() {
                if !existing.contains(&occupant) {
                    repaired = repaired.vacate(occupant);
                    record(
                        &mut actions,
                        RepairAction::VacateDanglingOccupant {
                            grid: node_id,
                            occupant,
                        },
                    );
                }
            }
            *grid = repaired;
        }
    }

    let mut next_id = snapshot.next_id;
    if let Some(max_existing) = nodes.keys().next_back().copied()
        && next_id <= max_existing
    {
        let after = max_existing.checked_next().map_err(|error| RepairError {
            before_hash,
            report: report_before.clone(),
            reason: RepairFailure::ValidationFailed { error },
        })?;
        record(
            &mut actions,
            RepairAction::BumpNextId {
                before: next_id,
                after,
            },
        );
        next_id = after;
    }

    let repaired = ForestSnapshot {
        schema_version: snapshot.schema_version,
        next_id,
        nodes: nodes.into_values().collect(),
    };
    let forest = Forest::from_snapshot(repaired).map_err(|error| RepairError {
        before_hash,
        report: report_before.clone(),
        reason: RepairFailure::ValidationFailed { error },
    })?;
    let report_after = forest.to_snapshot().invariant_report();
    let after_hash = forest.state_hash();

    Ok(RepairOutcome {
        before_hash,
        after_hash,
        report_before,
        report_after,
        actions,
        forest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{CellDef, CellSpan, GridSpec};
    use crate::node::Direction;
    use tracing_test::traced_test;

    fn id(raw: u64) -> NodeId {
        NodeId::new(raw).expect("test id must be non-zero")
    }

    fn layout(raw: u64, parent: u64, order: u32) -> LayoutNode {
        LayoutNode::new(
            id(raw),
            NodeId::new(parent).ok(),
            order,
            LayoutNodeKind::layout(Direction::Row),
        )
    }

    fn widget(raw: u64, parent: u64, order: u32) -> LayoutNode {
        LayoutNode::new(
            id(raw),
            NodeId::new(parent).ok(),
            order,
            LayoutNodeKind::widget("w"),
        )
    }

    fn make_valid_snapshot() -> ForestSnapshot {
        ForestSnapshot {
            schema_version: FOREST_SCHEMA_VERSION,
            next_id: id(4),
            nodes: vec![layout(1, 0, 1), widget(2, 1, 1), widget(3, 1, 2)],
        }
    }

    #[test]
    fn valid_snapshot_has_clean_report() {
        let snapshot = make_valid_snapshot();
        let report = snapshot.invariant_report();
        assert!(report.is_clean(), "{report:?}");
        let outcome = snapshot.clone().repair_safe().expect("repair");
        assert!(outcome.actions.is_empty());
        assert_eq!(outcome.before_hash, outcome.after_hash);
        assert_eq!(outcome.forest.to_snapshot(), snapshot);
    }

    #[test]
    fn state_hash_ignores_node_order() {
        let snapshot = make_valid_snapshot();
        let mut shuffled = snapshot.clone();
        shuffled.nodes.reverse();
        assert_eq!(snapshot.state_hash(), shuffled.state_hash());
    }

    #[test]
    fn persisted_shape_uses_layout_array() {
        let json = serde_json::to_value(make_valid_snapshot()).expect("serialize");
        assert_eq!(json["schemaVersion"], serde_json::json!(1));
        assert_eq!(json["nextId"], serde_json::json!(4));
        assert_eq!(json["layout"][1]["parent"], serde_json::json!(1));
        assert_eq!(json["layout"][0]["parent"], serde_json::json!(0));
    }

    #[test]
    fn duplicate_ids_are_unrepairable() {
        let mut snapshot = make_valid_snapshot();
        snapshot.nodes.push(widget(2, 1, 3));
        let report = snapshot.invariant_report();
        assert!(report.has_unrepairable_errors());
        let err = snapshot.repair_safe().expect_err("duplicate ids");
        assert_eq!(
            err.reason,
            RepairFailure::UnsafeIssuesPresent {
                codes: vec![InvariantCode::DuplicateNodeId],
            }
        );
    }

    #[test]
    fn unsupported_schema_is_unrepairable() {
        let mut snapshot = make_valid_snapshot();
        snapshot.schema_version = 9;
        assert_eq!(
            snapshot.invariant_report().codes(),
            vec![InvariantCode::UnsupportedSchemaVersion]
        );
        assert!(snapshot.repair_safe().is_err());
    }

    #[test]
    #[traced_test]
    fn missing_parents_and_cycles_are_rerooted() {
        let snapshot = ForestSnapshot {
            schema_version: FOREST_SCHEMA_VERSION,
            next_id: id(2),
            nodes: vec![
                layout(1, 0, 1),
                layout(4, 9, 1),
                layout(5, 6, 1),
                layout(6, 5, 1),
            ],
        };
        let report = snapshot.invariant_report();
        assert_eq!(
            report.codes(),
            vec![
                InvariantCode::NextIdNotGreaterThanExisting,
                InvariantCode::MissingParent,
                InvariantCode::CycleDetected,
            ]
        );

        let outcome = snapshot.repair_safe().expect("repair");
        let forest = &outcome.forest;
        assert_eq!(forest.node(id(4)).and_then(|node| node.parent), None);
        assert_eq!(forest.node(id(5)).and_then(|node| node.parent), None);
        assert_eq!(forest.node(id(6)).and_then(|node| node.parent), Some(id(5)));
        assert_eq!(forest.next_id(), id(7));
        assert!(outcome.report_after.is_clean());
        let root_orders: Vec<u32> = forest.roots().iter().map(|node| node.order).collect();
        assert_eq!(root_orders, vec![1, 2, 3]);
        assert!(outcome.actions.contains(&RepairAction::RenumberSiblings { parent: None }));
        assert!(logs_contain("repairing layout snapshot"));
    }

    #[test]
    fn widget_children_are_hoisted() {
        let snapshot = ForestSnapshot {
            schema_version: FOREST_SCHEMA_VERSION,
            next_id: id(5),
            nodes: vec![
                layout(1, 0, 1),
                widget(2, 1, 1),
                widget(3, 2, 1),
                widget(4, 3, 1),
            ],
        };
        let outcome = snapshot.repair_safe().expect("repair");
        let forest = &outcome.forest;
        for raw in [2, 3, 4] {
            assert_eq!(forest.node(id(raw)).and_then(|node| node.parent), Some(id(1)));
        }
        forest.validate().expect("valid after repair");
    }

    #[test]
    fn dangling_occupants_are_vacated() {
        let mut grid = GridSpec::new(1, 2).expect("valid dimensions");
        let _ = grid.cells.insert(CellCoord::new(1, 1), CellDef::occupied(id(2)));
        let _ = grid.cells.insert(CellCoord::new(1, 2), CellDef::occupied(id(40)));
        let snapshot = ForestSnapshot {
            schema_version: FOREST_SCHEMA_VERSION,
            next_id: id(3),
            nodes: vec![
                LayoutNode::new(id(1), None, 1, LayoutNodeKind::grid(grid)),
                widget(2, 1, 1),
            ],
        };
        let report = snapshot.invariant_report();
        assert_eq!(report.codes(), vec![InvariantCode::DanglingOccupant]);
        assert!(!report.has_errors());

        let outcome = snapshot.repair_safe().expect("repair");
        assert_eq!(
            outcome.actions,
            vec![RepairAction::VacateDanglingOccupant {
                grid: id(1),
                occupant: id(40),
            }]
        );
        let grid = outcome.forest.grid(id(1)).expect("grid");
        assert_eq!(grid.occupants(), BTreeSet::from([id(2)]));
    }

    #[test]
    fn span_reaching_u32_max_is_clamped_on_lenient_load() {
        let snapshot: ForestSnapshot = serde_json::from_str(
            r#"{
              "schemaVersion": 1,
              "nextId": 2,
              "layout": [{
                "id": 1, "parent": 0, "order": 1, "kind": "grid",
                "grid": {
                  "rows": 3, "cols": 1,
                  "cells": {
                    "2.1": { "span": { "row": 4294967295, "col": 1 } },
                    "3.1": { "hide": true }
                  }
                }
              }]
            }"#,
        )
        .expect("snapshot should deserialize");
        let report = snapshot.invariant_report();
        assert_eq!(
            report.codes(),
            vec![InvariantCode::InvalidSpan, InvariantCode::OrphanHiddenCell]
        );
        assert!(Forest::from_snapshot(snapshot.clone()).is_err());

        let outcome = Forest::from_snapshot_lenient(snapshot).expect("repair");
        assert!(outcome.report_after.issues.is_empty());
        let grid = outcome.forest.grid(id(1)).expect("grid");
        assert_eq!(grid.cell(CellCoord::new(2, 1)).span, Some(CellSpan::new(2, 1)));
        assert_eq!(grid.span_owner_of(3, 1), Some(CellCoord::new(2, 1)));
    }

    #[test]
    fn zero_sized_grid_is_unrepairable() {
        let grid = GridSpec {
            rows: 0,
            cols: 2,
            row_unit: 80,
            row_heights: BTreeMap::new(),
            cells: BTreeMap::new(),
        };
        let snapshot = ForestSnapshot {
            schema_version: FOREST_SCHEMA_VERSION,
            next_id: id(2),
            nodes: vec![LayoutNode::new(id(1), None, 1, LayoutNodeKind::grid(grid))],
        };
        let err = snapshot.repair_safe().expect_err("zero rows");
        assert_eq!(
            err.reason,
            RepairFailure::UnsafeIssuesPresent {
                codes: vec![InvariantCode::InvalidGridDimensions],
            }
        );
    }
}

//! Flat, parent-indexed forest of layout nodes.
//!
//! Every mutation borrows the forest and returns a new one, so a rejected
//! edit never leaves a half-applied state behind.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{GridError, InvalidParentReason, LayoutError, LayoutModelError};
use crate::grid::{CellCoord, GridSpec, SplitAxis};
use crate::id::{NodeId, NodeIdAllocator};
use crate::node::{LayoutNode, LayoutNodeKind};
use crate::snapshot::{
    FOREST_SCHEMA_VERSION, ForestSnapshot, RepairError, RepairOutcome, layout_state_hash,
};

/// Which neighbour a node trades places with in [`Forest::reorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReorderDirection {
    Earlier,
    Later,
}

/// Validated layout forest.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Forest {
    allocator: NodeIdAllocator,
    nodes: BTreeMap<NodeId, LayoutNode>,
}

impl Forest {
    /// Empty forest; the first allocated id is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct and validate from a persisted snapshot.
    pub fn from_snapshot(mut snapshot: ForestSnapshot) -> Result<Self, LayoutModelError> {
        if snapshot.schema_version != FOREST_SCHEMA_VERSION {
            return Err(LayoutModelError::UnsupportedSchemaVersion {
                version: snapshot.schema_version,
            });
        }
        snapshot.canonicalize();
        let mut nodes = BTreeMap::new();
        for node in snapshot.nodes {
            let node_id = node.id;
            if nodes.insert(node_id, node).is_some() {
                return Err(LayoutModelError::DuplicateNodeId { node_id });
            }
        }
        validate_forest(snapshot.next_id, &nodes)?;
        Ok(Self {
            allocator: NodeIdAllocator::with_next(snapshot.next_id),
            nodes,
        })
    }

    /// Repair recoverable defects, then construct.
    pub fn from_snapshot_lenient(snapshot: ForestSnapshot) -> Result<RepairOutcome, RepairError> {
        snapshot.repair_safe()
    }

    /// Export in canonical (id-sorted) form.
    #[must_use]
    pub fn to_snapshot(&self) -> ForestSnapshot {
        ForestSnapshot {
            schema_version: FOREST_SCHEMA_VERSION,
            next_id: self.next_id(),
            nodes: self.nodes.values().cloned().collect(),
        }
    }

    /// Next id the allocator will hand out.
    #[must_use]
    pub const fn next_id(&self) -> NodeId {
        self.allocator.peek()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &LayoutNode> {
        self.nodes.values()
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&LayoutNode> {
        self.nodes.get(&id)
    }

    pub fn validate(&self) -> Result<(), LayoutModelError> {
        validate_forest(self.next_id(), &self.nodes)
    }

    /// Deterministic structural hash, equal to the hash of [`Forest::to_snapshot`].
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        layout_state_hash(FOREST_SCHEMA_VERSION, self.next_id(), self.nodes.values())
    }

    pub fn find_by_id(&self, id: NodeId) -> Result<&LayoutNode, LayoutError> {
        self.nodes
            .get(&id)
            .ok_or(LayoutError::NotFound { node_id: id })
    }

    /// Direct children of `id` in sibling order.
    #[must_use]
    pub fn children_of(&self, id: NodeId) -> Vec<&LayoutNode> {
        self.ordered_siblings(Some(id))
    }

    /// Top-level nodes in sibling order.
    #[must_use]
    pub fn roots(&self) -> Vec<&LayoutNode> {
        self.ordered_siblings(None)
    }

    /// Whether `candidate` lies on the parent chain of `node`.
    #[must_use]
    pub fn is_ancestor(&self, candidate: NodeId, node: NodeId) -> bool {
        self.ancestors(node).contains(&candidate)
    }

    /// Parent chain of `id`, nearest first.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut cursor = self.nodes.get(&id).and_then(|node| node.parent);
        while let Some(parent) = cursor {
            if chain.contains(&parent) || chain.len() > self.nodes.len() {
                break;
            }
            chain.push(parent);
            cursor = self.nodes.get(&parent).and_then(|node| node.parent);
        }
        chain
    }

    /// All nodes below `id`, breadth first in sibling order.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let children = self.children_index();
        let mut found = Vec::new();
        let mut seen = BTreeSet::from([id]);
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for child in children.get(&Some(current)).into_iter().flatten() {
                if seen.insert(*child) {
                    found.push(*child);
                    queue.push_back(*child);
                }
            }
        }
        found
    }

    /// Add a top-level node.
    pub fn add_root(&self, kind: LayoutNodeKind) -> Result<(Self, NodeId), LayoutError> {
        let mut next = self.clone();
        let id = next.insert_node(None, kind)?;
        Ok((next, id))
    }

    /// Add `kind` as the last child of `parent`.
    pub fn add_child(&self, parent: NodeId, kind: LayoutNodeKind) -> Result<(Self, NodeId), LayoutError> {
        self.require_container(parent)?;
        let mut next = self.clone();
        let id = next.insert_node(Some(parent), kind)?;
        Ok((next, id))
    }

    /// Remove `id` and all of its descendants.
    ///
    /// Grid cells elsewhere that still reference removed nodes are left as
    /// they are; see [`Forest::remove_node_and_vacate`].
    pub fn remove_node(&self, id: NodeId) -> Result<Self, LayoutError> {
        let _ = self.find_by_id(id)?;
        let mut next = self.clone();
        let _ = next.detach_subtree(id);
        Ok(next)
    }

    /// Remove `id` with its descendants and clear every cell holding them.
    pub fn remove_node_and_vacate(&self, id: NodeId) -> Result<Self, LayoutError> {
        let _ = self.find_by_id(id)?;
        let mut next = self.clone();
        let removed = next.detach_subtree(id);
        next.vacate_all(&removed);
        Ok(next)
    }

    /// Move `moved` (with its subtree) to the end of `new_parent`'s children.
    pub fn reparent(&self, moved: NodeId, new_parent: NodeId) -> Result<Self, LayoutError> {
        let node = self.find_by_id(moved)?;
        let old_parent = node.parent;
        if moved == new_parent || self.is_ancestor(moved, new_parent) {
            return Err(LayoutError::CycleDetected {
                node_id: moved,
                new_parent,
            });
        }
        self.require_container(new_parent)?;

        let mut next = self.clone();
        let order = next.next_order(Some(new_parent));
        if let Some(record) = next.nodes.get_mut(&moved) {
            record.parent = Some(new_parent);
            record.order = order;
        }
        next.renormalize_siblings(old_parent);
        next.renormalize_siblings(Some(new_parent));

        if let Some(old) = old_parent
            && old != new_parent
            && let Some(record) = next.nodes.get_mut(&old)
            && let LayoutNodeKind::Grid { grid } = &mut record.kind
        {
            *grid = grid.vacate(moved);
        }
        Ok(next)
    }

    /// Flip the direction of a workspace or layout node.
    ///
    /// Grid and widget nodes have no direction and come back unchanged.
    pub fn change_direction(&self, id: NodeId) -> Result<Self, LayoutError> {
        let _ = self.find_by_id(id)?;
        let mut next = self.clone();
        if let Some(record) = next.nodes.get_mut(&id) {
            match &mut record.kind {
                LayoutNodeKind::Workspace { direction } | LayoutNodeKind::Layout { direction } => {
                    *direction = direction.flipped();
                }
                LayoutNodeKind::Widget { .. } | LayoutNodeKind::Grid { .. } => {}
            }
        }
        Ok(next)
    }

    /// Swap `id` with its adjacent sibling; a no-op at either end.
    pub fn reorder(&self, id: NodeId, direction: ReorderDirection) -> Result<Self, LayoutError> {
        let node = self.find_by_id(id)?;
        let siblings: Vec<NodeId> = self
            .ordered_siblings(node.parent)
            .into_iter()
            .map(|sibling| sibling.id)
            .collect();
        let Some(position) = siblings.iter().position(|sibling| *sibling == id) else {
            return Err(LayoutError::NotFound { node_id: id });
        };
        let neighbour = match direction {
            ReorderDirection::Earlier => position.checked_sub(1),
            ReorderDirection::Later => Some(position + 1).filter(|index| *index < siblings.len()),
        };
        let Some(neighbour) = neighbour.map(|index| siblings[index]) else {
            return Ok(self.clone());
        };

        let mut next = self.clone();
        let order = next.nodes.get(&id).map_or(0, |record| record.order);
        let other = next.nodes.get(&neighbour).map_or(0, |record| record.order);
        if let Some(record) = next.nodes.get_mut(&id) {
            record.order = other;
        }
        if let Some(record) = next.nodes.get_mut(&neighbour) {
            record.order = order;
        }
        Ok(next)
    }

    /// Set (or clear, with `None`) the provider bound to a widget slot.
    pub fn set_selected_provider(
        &self,
        widget: NodeId,
        slot: &str,
        provider: Option<String>,
    ) -> Result<Self, LayoutError> {
        let node = self.find_by_id(widget)?;
        if node.kind.is_container() {
            return Err(LayoutError::NotAWidget { node_id: widget });
        }
        let mut next = self.clone();
        if let Some(record) = next.nodes.get_mut(&widget)
            && let LayoutNodeKind::Widget {
                selected_providers, ..
            } = &mut record.kind
        {
            match provider {
                Some(provider) => {
                    let _ = selected_providers.insert(slot.to_string(), provider);
                }
                None => {
                    let _ = selected_providers.remove(slot);
                }
            }
        }
        Ok(next)
    }

    /// Rewrite every sibling set to dense ranks `1..=n`, keeping relative order.
    #[must_use]
    pub fn renormalize_orders(&self) -> Self {
        let mut next = self.clone();
        let parents: BTreeSet<Option<NodeId>> = next.nodes.values().map(|node| node.parent).collect();
        for parent in parents {
            next.renormalize_siblings(parent);
        }
        next
    }

    /// Grid carried by `grid_id`.
    pub fn grid(&self, grid_id: NodeId) -> Result<&GridSpec, LayoutError> {
        self.find_by_id(grid_id)?
            .kind
            .grid_spec()
            .ok_or(LayoutError::NotAGrid { node_id: grid_id })
    }

    /// Replace the grid of `grid_id` with the result of `edit`.
    ///
    /// Children of the grid whose cells disappear in the edit are removed
    /// together with their subtrees.
    pub fn edit_grid<F>(&self, grid_id: NodeId, edit: F) -> Result<Self, LayoutError>
    where
        F: FnOnce(&GridSpec) -> Result<GridSpec, GridError>,
    {
        let current = self.grid(grid_id)?;
        let updated = edit(current).map_err(|source| LayoutError::Grid {
            node_id: grid_id,
            source,
        })?;
        let evicted = current.evicted_in(&updated);

        let mut next = self.clone();
        if let Some(record) = next.nodes.get_mut(&grid_id) {
            record.kind = LayoutNodeKind::Grid { grid: updated };
        }
        let mut removed = BTreeSet::new();
        for occupant in evicted {
            let is_child = next
                .nodes
                .get(&occupant)
                .is_some_and(|node| node.parent == Some(grid_id));
            if is_child {
                tracing::debug!(
                    grid = grid_id.get(),
                    node = occupant.get(),
                    "removing node evicted from its grid cell"
                );
                removed.extend(next.detach_subtree(occupant));
            }
        }
        if !removed.is_empty() {
            next.vacate_all(&removed);
        }
        Ok(next)
    }

    pub fn split_cell(
        &self,
        grid_id: NodeId,
        coord: CellCoord,
        axis: SplitAxis,
        count: u32,
    ) -> Result<Self, LayoutError> {
        self.edit_grid(grid_id, |grid| grid.split_cell(coord, axis, count))
    }

    /// Merge cells of `grid_id`; `keep` must be an existing child of that grid.
    pub fn merge_cells(
        &self,
        grid_id: NodeId,
        coords: &[CellCoord],
        keep: Option<NodeId>,
    ) -> Result<Self, LayoutError> {
        let _ = self.grid(grid_id)?;
        if let Some(node_id) = keep {
            let node = self.node(node_id).ok_or(LayoutError::NotFound { node_id })?;
            if node.parent != Some(grid_id) {
                return Err(LayoutError::NotInGrid {
                    node_id,
                    grid: grid_id,
                });
            }
        }
        self.edit_grid(grid_id, |grid| grid.merge_cells(coords, keep))
    }

    pub fn insert_row(&self, grid_id: NodeId, after: u32) -> Result<Self, LayoutError> {
        self.edit_grid(grid_id, |grid| grid.insert_row(after))
    }

    pub fn delete_row(&self, grid_id: NodeId, row: u32) -> Result<Self, LayoutError> {
        self.edit_grid(grid_id, |grid| grid.delete_row(row))
    }

    pub fn insert_column(&self, grid_id: NodeId, after: u32) -> Result<Self, LayoutError> {
        self.edit_grid(grid_id, |grid| grid.insert_column(after))
    }

    pub fn delete_column(&self, grid_id: NodeId, col: u32) -> Result<Self, LayoutError> {
        self.edit_grid(grid_id, |grid| grid.delete_column(col))
    }

    pub fn move_occupant(
        &self,
        grid_id: NodeId,
        from: CellCoord,
        to: CellCoord,
    ) -> Result<Self, LayoutError> {
        self.edit_grid(grid_id, |grid| grid.move_occupant(from, to))
    }

    pub fn change_row_height(
        &self,
        grid_id: NodeId,
        row: u32,
        multiplier: u32,
    ) -> Result<Self, LayoutError> {
        self.edit_grid(grid_id, |grid| grid.change_row_height(row, multiplier))
    }

    /// Create `kind` as a child of `grid_id` and place it into `coord`.
    pub fn place_in_cell(
        &self,
        grid_id: NodeId,
        coord: CellCoord,
        kind: LayoutNodeKind,
    ) -> Result<(Self, NodeId), LayoutError> {
        let grid = self.grid(grid_id)?;
        let id = self.next_id();
        let placed = grid.place_occupant(coord, id).map_err(|source| LayoutError::Grid {
            node_id: grid_id,
            source,
        })?;
        let (mut next, created) = self.add_child(grid_id, kind)?;
        if let Some(record) = next.nodes.get_mut(&grid_id) {
            record.kind = LayoutNodeKind::Grid { grid: placed };
        }
        Ok((next, created))
    }

    fn require_container(&self, parent: NodeId) -> Result<(), LayoutError> {
        let Some(node) = self.nodes.get(&parent) else {
            return Err(LayoutError::InvalidParent {
                parent,
                reason: InvalidParentReason::Missing,
            });
        };
        if !node.kind.is_container() {
            return Err(LayoutError::InvalidParent {
                parent,
                reason: InvalidParentReason::WidgetParent,
            });
        }
        Ok(())
    }

    fn insert_node(&mut self, parent: Option<NodeId>, kind: LayoutNodeKind) -> Result<NodeId, LayoutError> {
        let id = self.allocator.allocate()?;
        let order = self.next_order(parent);
        let _ = self.nodes.insert(id, LayoutNode::new(id, parent, order, kind));
        Ok(id)
    }

    fn next_order(&self, parent: Option<NodeId>) -> u32 {
        self.nodes
            .values()
            .filter(|node| node.parent == parent)
            .map(|node| node.order)
            .max()
            .map_or(1, |order| order.saturating_add(1))
    }

    fn ordered_siblings(&self, parent: Option<NodeId>) -> Vec<&LayoutNode> {
        let mut siblings: Vec<&LayoutNode> = self
            .nodes
            .values()
            .filter(|node| node.parent == parent)
            .collect();
        siblings.sort_by_key(|node| (node.order, node.id));
        siblings
    }

    fn children_index(&self) -> BTreeMap<Option<NodeId>, Vec<NodeId>> {
        let mut index: BTreeMap<Option<NodeId>, Vec<&LayoutNode>> = BTreeMap::new();
        for node in self.nodes.values() {
            index.entry(node.parent).or_default().push(node);
        }
        index
            .into_iter()
            .map(|(parent, mut children)| {
                children.sort_by_key(|node| (node.order, node.id));
                (parent, children.into_iter().map(|node| node.id).collect())
            })
            .collect()
    }

    pub(crate) fn renormalize_siblings(&mut self, parent: Option<NodeId>) {
        let ordered: Vec<NodeId> = self
            .ordered_siblings(parent)
            .into_iter()
            .map(|node| node.id)
            .collect();
        for (rank, id) in (1u32..).zip(ordered) {
            if let Some(record) = self.nodes.get_mut(&id) {
                record.order = rank;
            }
        }
    }

    /// Remove `id` and its subtree, returning every removed id.
    fn detach_subtree(&mut self, id: NodeId) -> BTreeSet<NodeId> {
        let parent = self.nodes.get(&id).and_then(|node| node.parent);
        let mut removed: BTreeSet<NodeId> = self.descendants(id).into_iter().collect();
        let _ = removed.insert(id);
        for node_id in &removed {
            let _ = self.nodes.remove(node_id);
        }
        self.renormalize_siblings(parent);
        removed
    }

    fn vacate_all(&mut self, removed: &BTreeSet<NodeId>) {
        for record in self.nodes.values_mut() {
            if let LayoutNodeKind::Grid { grid } = &mut record.kind
                && grid.occupants().iter().any(|node| removed.contains(node))
            {
                let mut cleared = grid.clone();
                for node in removed {
                    cleared = cleared.vacate(*node);
                }
                *grid = cleared;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn from_parts(next_id: NodeId, nodes: BTreeMap<NodeId, LayoutNode>) -> Self {
        Self {
            allocator: NodeIdAllocator::with_next(next_id),
            nodes,
        }
    }
}

pub(crate) fn validate_forest(
    next_id: NodeId,
    nodes: &BTreeMap<NodeId, LayoutNode>,
) -> Result<(), LayoutModelError> {
    if let Some(max_existing) = nodes.keys().next_back().copied()
        && next_id <= max_existing
    {
        return Err(LayoutModelError::NextIdNotGreaterThanExisting {
            next_id,
            max_existing,
        });
    }

    let mut orders: BTreeSet<(Option<NodeId>, u32)> = BTreeSet::new();
    for node in nodes.values() {
        if let Some(parent) = node.parent {
            let Some(parent_node) = nodes.get(&parent) else {
                return Err(LayoutModelError::MissingParent {
                    node_id: node.id,
                    parent,
                });
            };
            if !parent_node.kind.is_container() {
                return Err(LayoutModelError::WidgetHasChildren {
                    node_id: parent,
                    child: node.id,
                });
            }
        }
        if !orders.insert((node.parent, node.order)) {
            return Err(LayoutModelError::DuplicateSiblingOrder {
                parent: node.parent,
                order: node.order,
            });
        }
        if let Some(grid) = node.kind.grid_spec()
            && let Some(issue) = grid.consistency_issues().into_iter().next()
        {
            return Err(LayoutModelError::InvalidGrid {
                node_id: node.id,
                issue,
            });
        }
    }

    for node in nodes.values() {
        let mut seen = BTreeSet::from([node.id]);
        let mut cursor = node.parent;
        while let Some(parent) = cursor {
            if !seen.insert(parent) {
                return Err(LayoutModelError::CycleDetected { node_id: node.id });
            }
            cursor = nodes.get(&parent).and_then(|record| record.parent);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvalidCellReason;
    use crate::grid::{CellDef, CellSpan};
    use crate::node::Direction;

    fn id(raw: u64) -> NodeId {
        NodeId::new(raw).expect("test id must be non-zero")
    }

    fn coord(row: u32, col: u32) -> CellCoord {
        CellCoord::new(row, col)
    }

    /// workspace(1) -> layout(2) -> [widget(3), widget(4)], grid(5) under 1
    /// holding widget(6) at 1.1.
    fn sample_forest() -> Forest {
        let forest = Forest::new();
        let (forest, workspace) = forest
            .add_root(LayoutNodeKind::workspace(Direction::Col))
            .expect("root");
        let (forest, layout) = forest
            .add_child(workspace, LayoutNodeKind::layout(Direction::Row))
            .expect("layout");
        let (forest, _) = forest
            .add_child(layout, LayoutNodeKind::widget("text"))
            .expect("widget a");
        let (forest, _) = forest
            .add_child(layout, LayoutNodeKind::widget("chart"))
            .expect("widget b");
        let (forest, grid) = forest
            .add_child(
                workspace,
                LayoutNodeKind::grid(GridSpec::new(2, 2).expect("valid dimensions")),
            )
            .expect("grid");
        let (forest, _) = forest
            .place_in_cell(grid, coord(1, 1), LayoutNodeKind::widget("gauge"))
            .expect("placed widget");
        forest.validate().expect("sample forest should be valid");
        forest
    }

    fn child_ids(forest: &Forest, parent: NodeId) -> Vec<u64> {
        forest
            .children_of(parent)
            .into_iter()
            .map(|node| node.id.get())
            .collect()
    }

    #[test]
    fn queries_follow_parent_links() {
        let forest = sample_forest();
        assert_eq!(child_ids(&forest, id(1)), vec![2, 5]);
        assert_eq!(child_ids(&forest, id(2)), vec![3, 4]);
        assert_eq!(
            forest.roots().iter().map(|node| node.id).collect::<Vec<_>>(),
            vec![id(1)]
        );
        assert!(forest.is_ancestor(id(1), id(4)));
        assert!(!forest.is_ancestor(id(4), id(1)));
        assert!(!forest.is_ancestor(id(3), id(3)));
        assert_eq!(forest.ancestors(id(6)), vec![id(5), id(1)]);
        assert_eq!(
            forest.descendants(id(1)),
            vec![id(2), id(5), id(3), id(4), id(6)]
        );
        assert_eq!(
            forest.find_by_id(id(42)),
            Err(LayoutError::NotFound { node_id: id(42) })
        );
        assert_eq!(forest.next_id(), id(7));
    }

    #[test]
    fn add_child_rejects_widget_and_missing_parents() {
        let forest = sample_forest();
        assert_eq!(
            forest.add_child(id(3), LayoutNodeKind::widget("x")),
            Err(LayoutError::InvalidParent {
                parent: id(3),
                reason: InvalidParentReason::WidgetParent,
            })
        );
        assert_eq!(
            forest.add_child(id(99), LayoutNodeKind::widget("x")),
            Err(LayoutError::InvalidParent {
                parent: id(99),
                reason: InvalidParentReason::Missing,
            })
        );
        let (grown, created) = forest
            .add_child(id(2), LayoutNodeKind::widget("x"))
            .expect("add");
        assert_eq!(created, id(7));
        assert_eq!(grown.find_by_id(created).map(|node| node.order), Ok(3));
    }

    #[test]
    fn remove_node_drops_subtree_and_renumbers() {
        let forest = sample_forest();
        let trimmed = forest.remove_node(id(2)).expect("remove");
        assert!(trimmed.node(id(3)).is_none());
        assert!(trimmed.node(id(4)).is_none());
        assert_eq!(trimmed.find_by_id(id(5)).map(|node| node.order), Ok(1));
        trimmed.validate().expect("still valid");
        // The input is untouched.
        assert!(forest.node(id(3)).is_some());
    }

    #[test]
    fn remove_node_leaves_cells_unless_asked() {
        let forest = sample_forest();
        let plain = forest.remove_node(id(6)).expect("remove");
        assert_eq!(
            plain.grid(id(5)).map(|grid| grid.find_occupant(id(6))),
            Ok(Some(coord(1, 1)))
        );
        let vacated = forest.remove_node_and_vacate(id(6)).expect("remove");
        assert_eq!(
            vacated.grid(id(5)).map(|grid| grid.occupants().is_empty()),
            Ok(true)
        );
    }

    #[test]
    fn reparent_into_a_widget_is_rejected() {
        let forest = sample_forest();
        assert_eq!(
            forest.reparent(id(3), id(4)),
            Err(LayoutError::InvalidParent {
                parent: id(4),
                reason: InvalidParentReason::WidgetParent,
            })
        );
    }

    #[test]
    fn reparent_rejects_cycles() {
        let forest = sample_forest();
        assert_eq!(
            forest.reparent(id(1), id(2)),
            Err(LayoutError::CycleDetected {
                node_id: id(1),
                new_parent: id(2),
            })
        );
        assert_eq!(
            forest.reparent(id(2), id(2)),
            Err(LayoutError::CycleDetected {
                node_id: id(2),
                new_parent: id(2),
            })
        );
        assert_eq!(
            forest.reparent(id(77), id(2)),
            Err(LayoutError::NotFound { node_id: id(77) })
        );
    }

    #[test]
    fn reparent_appends_and_vacates_the_old_grid() {
        let forest = sample_forest();
        let moved = forest.reparent(id(6), id(2)).expect("reparent");
        moved.validate().expect("still valid");
        assert_eq!(child_ids(&moved, id(2)), vec![3, 4, 6]);
        assert_eq!(moved.grid(id(5)).map(GridSpec::occupants), Ok(BTreeSet::new()));

        let moved = forest.reparent(id(3), id(1)).expect("reparent");
        assert_eq!(child_ids(&moved, id(1)), vec![2, 5, 3]);
        assert_eq!(moved.find_by_id(id(4)).map(|node| node.order), Ok(1));
    }

    #[test]
    fn change_direction_flips_containers_only() {
        let forest = sample_forest();
        let flipped = forest.change_direction(id(2)).expect("flip");
        assert_eq!(
            flipped.find_by_id(id(2)).map(|node| node.kind.direction()),
            Ok(Some(Direction::Col))
        );
        assert_eq!(forest.change_direction(id(5)), Ok(forest.clone()));
        assert_eq!(forest.change_direction(id(3)), Ok(forest.clone()));
    }

    #[test]
    fn reorder_swaps_neighbours() {
        let forest = sample_forest();
        let swapped = forest.reorder(id(4), ReorderDirection::Earlier).expect("reorder");
        assert_eq!(child_ids(&swapped, id(2)), vec![4, 3]);
        assert_eq!(forest.reorder(id(3), ReorderDirection::Earlier), Ok(forest.clone()));
        assert_eq!(forest.reorder(id(4), ReorderDirection::Later), Ok(forest.clone()));
    }

    #[test]
    fn renormalize_orders_produces_dense_ranks() {
        let mut nodes = BTreeMap::new();
        for (raw, order) in [(1, 10), (2, 4), (3, 7)] {
            let _ = nodes.insert(
                id(raw),
                LayoutNode::new(id(raw), None, order, LayoutNodeKind::layout(Direction::Row)),
            );
        }
        let forest = Forest::from_parts(id(4), nodes).renormalize_orders();
        let ranked: Vec<(u64, u32)> = forest
            .roots()
            .into_iter()
            .map(|node| (node.id.get(), node.order))
            .collect();
        assert_eq!(ranked, vec![(2, 1), (3, 2), (1, 3)]);
    }

    #[test]
    fn selected_providers_only_on_widgets() {
        let forest = sample_forest();
        let bound = forest
            .set_selected_provider(id(3), "logs", Some("loki".to_string()))
            .expect("bind");
        let LayoutNodeKind::Widget {
            selected_providers, ..
        } = &bound.find_by_id(id(3)).expect("widget").kind
        else {
            unreachable!("node 3 is a widget");
        };
        assert_eq!(selected_providers.get("logs").map(String::as_str), Some("loki"));
        assert_eq!(
            forest.set_selected_provider(id(2), "logs", None),
            Err(LayoutError::NotAWidget { node_id: id(2) })
        );
    }

    #[test]
    fn split_evicts_and_removes_the_occupant() {
        let forest = sample_forest();
        let split = forest
            .split_cell(id(5), coord(1, 1), SplitAxis::Horizontal, 2)
            .expect("split");
        split.validate().expect("still valid");
        assert!(split.node(id(6)).is_none());
        assert_eq!(split.grid(id(5)).map(|grid| grid.cols), Ok(3));
    }

    #[test]
    fn grid_operations_on_other_kinds_fail() {
        let forest = sample_forest();
        assert_eq!(
            forest.insert_row(id(2), 0),
            Err(LayoutError::NotAGrid { node_id: id(2) })
        );
        assert_eq!(
            forest.delete_row(id(5), 9),
            Err(LayoutError::Grid {
                node_id: id(5),
                source: GridError::OutOfRange {
                    axis: crate::grid::GridAxis::Row,
                    index: 9,
                    len: 2,
                },
            })
        );
    }

    #[test]
    fn merge_keeps_the_chosen_occupant() {
        let forest = sample_forest();
        let (forest, other) = forest
            .place_in_cell(id(5), coord(1, 2), LayoutNodeKind::widget("table"))
            .expect("placed");
        let merged = forest
            .merge_cells(id(5), &[coord(1, 1), coord(1, 2)], Some(id(6)))
            .expect("merge");
        merged.validate().expect("still valid");
        assert!(merged.node(other).is_none());
        let grid = merged.grid(id(5)).expect("grid");
        assert_eq!(grid.cell(coord(1, 1)).component, Some(id(6)));
        assert_eq!(grid.cell(coord(1, 1)).span, Some(CellSpan::new(1, 2)));
        assert_eq!(grid.cell(coord(1, 2)), CellDef::hidden());
    }

    #[test]
    fn merge_rejects_keeping_a_node_from_elsewhere() {
        let forest = sample_forest();
        let (forest, other_grid) = forest
            .add_child(
                id(1),
                LayoutNodeKind::grid(GridSpec::new(1, 1).expect("valid dimensions")),
            )
            .expect("second grid");
        let (forest, foreign) = forest
            .place_in_cell(other_grid, coord(1, 1), LayoutNodeKind::widget("map"))
            .expect("placed");
        let cells = [coord(1, 2), coord(2, 2)];

        assert_eq!(
            forest.merge_cells(id(5), &cells, Some(foreign)),
            Err(LayoutError::NotInGrid {
                node_id: foreign,
                grid: id(5),
            })
        );
        assert_eq!(
            forest.merge_cells(id(5), &cells, Some(id(3))),
            Err(LayoutError::NotInGrid {
                node_id: id(3),
                grid: id(5),
            })
        );
        assert_eq!(
            forest.merge_cells(id(5), &cells, Some(id(40))),
            Err(LayoutError::NotFound { node_id: id(40) })
        );
        assert!(forest.grid(id(5)).expect("grid").find_occupant(foreign).is_none());
    }

    #[test]
    fn place_in_hidden_cell_is_rejected() {
        let forest = sample_forest()
            .merge_cells(id(5), &[coord(2, 1), coord(2, 2)], None)
            .expect("merge");
        assert_eq!(
            forest.place_in_cell(id(5), coord(2, 2), LayoutNodeKind::widget("x")),
            Err(LayoutError::Grid {
                node_id: id(5),
                source: GridError::InvalidCell {
                    coord: coord(2, 2),
                    reason: InvalidCellReason::Hidden,
                },
            })
        );
    }

    #[test]
    fn state_hash_matches_snapshot_and_tracks_changes() {
        let forest = sample_forest();
        assert_eq!(forest.state_hash(), forest.to_snapshot().state_hash());
        let moved = forest.move_occupant(id(5), coord(1, 1), coord(2, 2)).expect("move");
        assert_ne!(forest.state_hash(), moved.state_hash());
        let back = Forest::from_snapshot(moved.to_snapshot()).expect("round trip");
        assert_eq!(back, moved);
    }

    #[test]
    fn validate_reports_widget_children_and_cycles() {
        let mut nodes = BTreeMap::new();
        let _ = nodes.insert(id(1), LayoutNode::new(id(1), None, 1, LayoutNodeKind::widget("w")));
        let _ = nodes.insert(id(2), LayoutNode::new(id(2), Some(id(1)), 1, LayoutNodeKind::widget("w")));
        assert_eq!(
            Forest::from_parts(id(3), nodes).validate(),
            Err(LayoutModelError::WidgetHasChildren {
                node_id: id(1),
                child: id(2),
            })
        );

        let mut nodes = BTreeMap::new();
        let _ = nodes.insert(
            id(1),
            LayoutNode::new(id(1), Some(id(2)), 1, LayoutNodeKind::layout(Direction::Row)),
        );
        let _ = nodes.insert(
            id(2),
            LayoutNode::new(id(2), Some(id(1)), 1, LayoutNodeKind::layout(Direction::Row)),
        );
        assert_eq!(
            Forest::from_parts(id(3), nodes).validate(),
            Err(LayoutModelError::CycleDetected { node_id: id(1) })
        );
    }
}

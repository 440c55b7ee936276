//! Structural grid mutations.
//!
//! Every operation borrows the grid and returns a fresh [`GridSpec`]; a
//! rejected operation leaves nothing behind for the caller to roll back.

use std::collections::BTreeSet;

use super::{
    CellCoord, CellDef, CellRect, CellSpan, GridAxis, GridSpec, MAX_SPLIT_COUNT, MIN_SPLIT_COUNT,
    SplitAxis,
};
use crate::error::{GridError, InvalidCellReason, InvalidSplitReason};
use crate::id::NodeId;

/// Whether plain coordinates exactly fill their bounding box.
///
/// Duplicates are ignored and the result does not depend on input order.
/// An empty selection is not rectangular.
#[must_use]
pub fn is_rectangular_selection(coords: &[CellCoord]) -> bool {
    let set: BTreeSet<CellCoord> = coords.iter().copied().collect();
    let Some(bounds) = set
        .iter()
        .map(|coord| CellRect::from_origin(*coord, CellSpan::UNIT))
        .reduce(CellRect::union)
    else {
        return false;
    };
    bounds.area() == set.len() as u64 && bounds.coords().all(|coord| set.contains(&coord))
}

impl GridSpec {
    /// Insert one empty row after `after` (`0` inserts before the first row).
    ///
    /// Spans straddling the insertion line grow by one row and cover the
    /// new coordinates, so they stay rectangular.
    pub fn insert_row(&self, after: u32) -> Result<Self, GridError> {
        self.insert_lines(GridAxis::Row, after, 1)
    }

    /// Column counterpart of [`GridSpec::insert_row`].
    pub fn insert_column(&self, after: u32) -> Result<Self, GridError> {
        self.insert_lines(GridAxis::Column, after, 1)
    }

    /// Delete `row`, dropping its cells and shifting later rows up.
    ///
    /// Fails with [`GridError::LastRow`] when no other row holds a visible
    /// cell.
    pub fn delete_row(&self, row: u32) -> Result<Self, GridError> {
        self.delete_line(GridAxis::Row, row)
    }

    /// Column counterpart of [`GridSpec::delete_row`].
    pub fn delete_column(&self, col: u32) -> Result<Self, GridError> {
        self.delete_line(GridAxis::Column, col)
    }

    pub(crate) fn insert_lines(
        &self,
        axis: GridAxis,
        after: u32,
        count: u32,
    ) -> Result<Self, GridError> {
        let len = self.extent(axis);
        if after > len {
            return Err(GridError::OutOfRange {
                axis,
                index: after,
                len,
            });
        }

        let cross = axis.cross();
        let mut next = self.clone();
        next.cells.clear();
        next.set_extent(axis, len + count);

        let mut straddlers = Vec::new();
        for (&coord, &cell) in &self.cells {
            let along = coord.along(axis);
            let mut cell = cell;
            if let (false, Some(span)) = (cell.hide, cell.span) {
                let rect = CellRect::from_origin(coord, span);
                if rect.start(axis) <= after && after < rect.end(axis) {
                    cell.span = Some(CellSpan::from_axis(
                        axis,
                        span.along(axis) + count,
                        span.along(cross),
                    ));
                    straddlers.push(rect);
                }
            }
            let shifted = if along > after {
                CellCoord::from_axis(axis, along + count, coord.along(cross))
            } else {
                coord
            };
            next.put(shifted, cell);
        }

        for rect in straddlers {
            for across in rect.start(cross)..=rect.end(cross) {
                for along in after + 1..=after + count {
                    next.put(CellCoord::from_axis(axis, along, across), CellDef::hidden());
                }
            }
        }

        if axis == GridAxis::Row {
            next.row_heights = self
                .row_heights
                .iter()
                .map(|(&row, &height)| (if row > after { row + count } else { row }, height))
                .collect();
        }
        Ok(next)
    }

    fn delete_line(&self, axis: GridAxis, index: u32) -> Result<Self, GridError> {
        let len = self.extent(axis);
        if index == 0 || index > len {
            return Err(GridError::OutOfRange { axis, index, len });
        }
        let others_visible = (1..=len)
            .filter(|&line| line != index)
            .any(|line| self.line_has_visible_cell(axis, line));
        if !others_visible {
            return Err(match axis {
                GridAxis::Row => GridError::LastRow { row: index },
                GridAxis::Column => GridError::LastColumn { col: index },
            });
        }
        Ok(self.remove_line(axis, index))
    }

    /// Drop line `index` unconditionally.
    ///
    /// Spans crossing the line shrink by one. An origin on the line whose
    /// span continues past it is re-anchored on the following line with its
    /// occupant.
    fn remove_line(&self, axis: GridAxis, index: u32) -> Self {
        let cross = axis.cross();
        let mut next = self.clone();
        next.cells.clear();
        next.set_extent(axis, self.extent(axis).saturating_sub(1));

        let mut reanchored = Vec::new();
        for (&coord, &cell) in &self.cells {
            let along = coord.along(axis);
            let across = coord.along(cross);
            if along == index {
                if let (false, Some(span)) = (cell.hide, cell.span)
                    && span.along(axis) > 1
                {
                    let span = CellSpan::from_axis(axis, span.along(axis) - 1, span.along(cross));
                    reanchored.push((
                        CellCoord::from_axis(axis, index, across),
                        CellDef {
                            span: span.normalized(),
                            ..cell
                        },
                    ));
                }
                continue;
            }

            let mut cell = cell;
            if let (false, Some(span), true) = (cell.hide, cell.span, along < index) {
                let rect = CellRect::from_origin(coord, span);
                if rect.end(axis) >= index {
                    cell.span =
                        CellSpan::from_axis(axis, span.along(axis) - 1, span.along(cross))
                            .normalized();
                }
            }
            let shifted = if along > index {
                CellCoord::from_axis(axis, along - 1, across)
            } else {
                coord
            };
            next.put(shifted, cell);
        }
        for (coord, cell) in reanchored {
            next.put(coord, cell);
        }

        if axis == GridAxis::Row {
            next.row_heights = self
                .row_heights
                .iter()
                .filter(|&(&row, _)| row != index)
                .map(|(&row, &height)| (if row > index { row - 1 } else { row }, height))
                .collect();
        }
        next
    }

    /// Remove every row and column (other than the first) that holds no
    /// visible cell.
    ///
    /// Every span crossing a removed row also covers the row above it, so
    /// the removed multiplier is added to that row and rendered heights do
    /// not change.
    #[must_use]
    pub fn compact(&self) -> Self {
        let mut next = self.clone();
        for axis in [GridAxis::Row, GridAxis::Column] {
            next = next.compact_lines(axis, 1, next.extent(axis));
        }
        next
    }

    /// Compact span-only lines in `first + 1..=last`, last to first.
    fn compact_lines(&self, axis: GridAxis, first: u32, last: u32) -> Self {
        let mut next = self.clone();
        let mut line = last.min(next.extent(axis));
        while line > first.max(1) {
            if !next.line_has_visible_cell(axis, line) {
                tracing::trace!(%axis, line, "compacting grid line without visible cells");
                next = next.fold_line(axis, line);
            }
            line -= 1;
        }
        next
    }

    /// Remove line `index` (never the first), keeping its row height.
    fn fold_line(&self, axis: GridAxis, index: u32) -> Self {
        let mut next = self.remove_line(axis, index);
        if axis == GridAxis::Row && index >= 2 {
            let above = index - 1;
            let folded = self.row_height(above).saturating_add(self.row_height(index));
            let _ = next.row_heights.insert(above, folded);
        }
        next
    }

    /// Split the visible cell at `coord` into `count` empty parts.
    ///
    /// The current occupant is discarded. When the cell is narrower than
    /// `count` along the split axis, structural lines are inserted right
    /// after it and the neighbouring cells on other lines widen to absorb
    /// them, so only the split cell looks different.
    pub fn split_cell(&self, coord: CellCoord, axis: SplitAxis, count: u32) -> Result<Self, GridError> {
        self.check_bounds(coord)?;
        if !(MIN_SPLIT_COUNT..=MAX_SPLIT_COUNT).contains(&count) {
            return Err(GridError::InvalidSplit {
                coord,
                reason: InvalidSplitReason::CountOutOfRange { count },
            });
        }
        let Some(mut rect) = self.footprint(coord) else {
            return Err(GridError::InvalidSplit {
                coord,
                reason: InvalidSplitReason::HiddenCell,
            });
        };

        let line_axis = axis.line_axis();
        let cross = line_axis.cross();
        let mut next = self.clone();

        let extent = rect.len(line_axis);
        if extent < count {
            let added = count - extent;
            let end = rect.end(line_axis);

            let mut absorbers = BTreeSet::new();
            for across in 1..=self.extent(cross) {
                if rect.contains_line(cross, across) {
                    continue;
                }
                let owner = self.resolve(CellCoord::from_axis(line_axis, end, across))?;
                if let Some(owner_rect) = self.footprint(owner)
                    && owner_rect.end(line_axis) == end
                {
                    let _ = absorbers.insert(owner);
                }
            }

            next = next.insert_lines(line_axis, end, added)?;
            for owner in absorbers {
                let cell = self.cell(owner);
                let span = cell.span.unwrap_or_default();
                let owner_rect = CellRect::from_origin(owner, span);
                next.put(
                    owner,
                    CellDef {
                        span: CellSpan::from_axis(
                            line_axis,
                            span.along(line_axis) + added,
                            span.along(cross),
                        )
                        .normalized(),
                        ..cell
                    },
                );
                for along in end + 1..=end + added {
                    for across in owner_rect.start(cross)..=owner_rect.end(cross) {
                        next.put(CellCoord::from_axis(line_axis, along, across), CellDef::hidden());
                    }
                }
            }

            rect = CellRect::from_origin(
                rect.origin(),
                CellSpan::from_axis(line_axis, count, rect.len(cross)),
            );
        }

        let total = rect.len(line_axis);
        let base = total / count;
        let remainder = total % count;
        let mut start = rect.start(line_axis);
        for group in 0..count {
            let size = base + u32::from(group < remainder);
            let origin = CellCoord::from_axis(line_axis, start, rect.start(cross));
            let part = CellRect::from_origin(
                origin,
                CellSpan::from_axis(line_axis, size, rect.len(cross)),
            );
            for covered in part.coords() {
                next.put(covered, CellDef::hidden());
            }
            next.put(
                origin,
                CellDef {
                    component: None,
                    hide: false,
                    span: part.span().normalized(),
                },
            );
            start += size;
        }
        Ok(next)
    }

    /// Bounding rectangle of a selection of span owners, if they tile it.
    pub fn validate_rectangle(&self, coords: &[CellCoord]) -> Result<CellRect, GridError> {
        let mut owners = BTreeSet::new();
        for &coord in coords {
            let _ = owners.insert(self.resolve(coord)?);
        }
        let mut footprints = Vec::with_capacity(owners.len());
        for &owner in &owners {
            let rect = self.footprint(owner).ok_or(GridError::InvalidCell {
                coord: owner,
                reason: InvalidCellReason::Hidden,
            })?;
            footprints.push(rect);
        }
        let Some(bounds) = footprints.iter().copied().reduce(CellRect::union) else {
            return Err(GridError::EmptySelection);
        };
        let area: u64 = footprints.iter().map(CellRect::area).sum();
        let tiled = area == bounds.area()
            && bounds
                .coords()
                .all(|covered| self.resolve(covered).is_ok_and(|owner| owners.contains(&owner)));
        if !tiled {
            return Err(GridError::NonRectangular {
                bounds,
                selected: owners.len(),
            });
        }
        Ok(bounds)
    }

    /// Merge the selected cells into one visible cell holding `keep`.
    ///
    /// Hidden coordinates are resolved to their span owners first. Lines
    /// inside the merged box that are left without a visible cell are then
    /// compacted, as long as the box does not cover them end to end: a
    /// split's parts merge back into the grid they came from, while a merge
    /// spanning the whole grid keeps its full span.
    pub fn merge_cells(&self, coords: &[CellCoord], keep: Option<NodeId>) -> Result<Self, GridError> {
        let bounds = self.validate_rectangle(coords)?;
        if let Some(node) = keep
            && let Some(at) = self.find_occupant(node)
            && !bounds.contains(at)
        {
            return Err(GridError::OccupantElsewhere {
                occupant: node,
                coord: at,
            });
        }

        let mut next = self.clone();
        for covered in bounds.coords() {
            next.put(covered, CellDef::hidden());
        }
        next.put(
            bounds.origin(),
            CellDef {
                component: keep,
                hide: false,
                span: bounds.span().normalized(),
            },
        );
        for axis in [GridAxis::Row, GridAxis::Column] {
            if bounds.len(axis.cross()) < self.extent(axis.cross()) {
                next = next.compact_lines(axis, bounds.start(axis), bounds.end(axis));
            }
        }
        Ok(next)
    }

    /// Move the occupant of `from` into `to`, swapping when `to` is taken.
    pub fn move_occupant(&self, from: CellCoord, to: CellCoord) -> Result<Self, GridError> {
        self.require_visible(from)?;
        self.require_visible(to)?;
        if from == to {
            return Ok(self.clone());
        }
        let source = self.cell(from);
        let target = self.cell(to);
        let mut next = self.clone();
        next.put(
            from,
            CellDef {
                component: target.component,
                ..source
            },
        );
        next.put(
            to,
            CellDef {
                component: source.component,
                ..target
            },
        );
        Ok(next)
    }

    /// Set the height multiplier of `row`; `1` clears the entry.
    pub fn change_row_height(&self, row: u32, multiplier: u32) -> Result<Self, GridError> {
        if row == 0 || row > self.rows {
            return Err(GridError::OutOfRange {
                axis: GridAxis::Row,
                index: row,
                len: self.rows,
            });
        }
        if multiplier == 0 {
            return Err(GridError::InvalidRowHeight { row, multiplier });
        }
        let mut next = self.clone();
        if multiplier == 1 {
            let _ = next.row_heights.remove(&row);
        } else {
            let _ = next.row_heights.insert(row, multiplier);
        }
        Ok(next)
    }

    /// Put `node` into the empty visible cell at `coord`.
    pub fn place_occupant(&self, coord: CellCoord, node: NodeId) -> Result<Self, GridError> {
        self.require_visible(coord)?;
        let cell = self.cell(coord);
        match cell.component {
            Some(existing) if existing == node => return Ok(self.clone()),
            Some(existing) => {
                return Err(GridError::CellOccupied {
                    coord,
                    occupant: existing,
                });
            }
            None => {}
        }
        if let Some(at) = self.find_occupant(node) {
            return Err(GridError::OccupantElsewhere { occupant: node, coord: at });
        }
        let mut next = self.clone();
        next.put(
            coord,
            CellDef {
                component: Some(node),
                ..cell
            },
        );
        Ok(next)
    }

    /// Clear every cell referencing `node`.
    #[must_use]
    pub fn vacate(&self, node: NodeId) -> Self {
        let mut next = self.clone();
        let held: Vec<CellCoord> = self
            .cells
            .iter()
            .filter(|(_, cell)| cell.component == Some(node))
            .map(|(coord, _)| *coord)
            .collect();
        for coord in held {
            let cell = next.cell(coord);
            next.put(
                coord,
                CellDef {
                    component: None,
                    ..cell
                },
            );
        }
        next
    }

    /// Occupants present here but gone from `after`.
    #[must_use]
    pub fn evicted_in(&self, after: &Self) -> BTreeSet<NodeId> {
        let remaining = after.occupants();
        self.occupants()
            .into_iter()
            .filter(|node| !remaining.contains(node))
            .collect()
    }

    fn require_visible(&self, coord: CellCoord) -> Result<(), GridError> {
        self.check_bounds(coord)?;
        if self.is_hidden(coord) {
            return Err(GridError::InvalidCell {
                coord,
                reason: InvalidCellReason::Hidden,
            });
        }
        Ok(())
    }
}

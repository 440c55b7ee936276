//! Deterministic normalisation of damaged grid definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{CellCoord, CellDef, CellRect, CellSpan, GridSpec};
use crate::id::NodeId;

/// One change made while repairing a grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "repair", rename_all = "snake_case")]
pub enum GridRepair {
    DropOutOfBoundsCell {
        coord: CellCoord,
        component: Option<NodeId>,
    },
    DropRowHeight {
        row: u32,
        multiplier: u32,
    },
    ClearHiddenPayload {
        coord: CellCoord,
    },
    ClampSpan {
        coord: CellCoord,
        before: CellSpan,
        after: Option<CellSpan>,
    },
    /// A coordinate under someone else's span was visible.
    HideCoveredCell {
        coord: CellCoord,
        dropped: Option<NodeId>,
    },
    UnhideOrphan {
        coord: CellCoord,
    },
}

impl GridSpec {
    /// Repair structural defects in place of rejecting them.
    ///
    /// Spans are claimed in row-major order; a later span that collides
    /// with an earlier one is reduced to a single cell. The grid must have
    /// non-zero dimensions.
    #[must_use]
    pub fn repaired(&self) -> (Self, Vec<GridRepair>) {
        let mut actions = Vec::new();
        let mut next = self.clone();

        next.row_heights.clear();
        for (&row, &multiplier) in &self.row_heights {
            if row == 0 || row > self.rows || multiplier == 0 {
                actions.push(GridRepair::DropRowHeight { row, multiplier });
            } else {
                let _ = next.row_heights.insert(row, multiplier);
            }
        }

        next.cells.clear();
        for (&coord, &cell) in &self.cells {
            if !self.is_in_bounds(coord) {
                actions.push(GridRepair::DropOutOfBoundsCell {
                    coord,
                    component: cell.component,
                });
                continue;
            }
            if cell.hide && (cell.component.is_some() || cell.span.is_some()) {
                actions.push(GridRepair::ClearHiddenPayload { coord });
                next.put(coord, CellDef::hidden());
                continue;
            }
            next.put(coord, cell);
        }

        let mut claimed: BTreeMap<CellCoord, CellCoord> = BTreeMap::new();
        let origins: Vec<(CellCoord, CellSpan)> = next
            .cells
            .iter()
            .filter(|(_, cell)| !cell.hide)
            .filter_map(|(coord, cell)| cell.span.map(|span| (*coord, span)))
            .collect();
        for (origin, span) in origins {
            if claimed.contains_key(&origin) {
                continue;
            }
            let clamped = CellSpan::new(
                span.row.clamp(1, next.rows - origin.row + 1),
                span.col.clamp(1, next.cols - origin.col + 1),
            );
            let rect = CellRect::from_origin(origin, clamped);
            let collides = rect
                .coords()
                .any(|covered| covered != origin && claimed.contains_key(&covered));
            let fixed = if collides { None } else { clamped.normalized() };
            if fixed != Some(span) {
                actions.push(GridRepair::ClampSpan {
                    coord: origin,
                    before: span,
                    after: fixed,
                });
                let cell = next.cell(origin);
                next.put(origin, CellDef { span: fixed, ..cell });
            }
            if let Some(fixed) = fixed {
                for covered in CellRect::from_origin(origin, fixed).coords() {
                    let _ = claimed.insert(covered, origin);
                }
            }
        }

        for (&covered, &owner) in &claimed {
            if covered == owner {
                continue;
            }
            let cell = next.cell(covered);
            if !cell.hide {
                actions.push(GridRepair::HideCoveredCell {
                    coord: covered,
                    dropped: cell.component,
                });
                next.put(covered, CellDef::hidden());
            }
        }

        let orphans: Vec<CellCoord> = next
            .cells
            .iter()
            .filter(|(coord, cell)| cell.hide && !claimed.contains_key(coord))
            .map(|(coord, _)| *coord)
            .collect();
        for coord in orphans {
            actions.push(GridRepair::UnhideOrphan { coord });
            next.put(coord, CellDef::default());
        }

        (next, actions)
    }
}

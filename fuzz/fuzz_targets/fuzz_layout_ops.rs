#![no_main]

use arbitrary::Arbitrary;
use board_layout::{
    CellCoord, Direction, Forest, GridSpec, LayoutNodeKind, LayoutOperation, NodeId, SplitAxis,
};
use libfuzzer_sys::fuzz_target;

/// Compact operation script; indices are resolved against the current forest.
#[derive(Debug, Arbitrary)]
enum Step {
    Split { grid: u8, row: u8, col: u8, vertical: bool, count: u8 },
    Merge { grid: u8, top: u8, left: u8, height: u8, width: u8 },
    InsertRow { grid: u8, after: u8 },
    DeleteRow { grid: u8, row: u8 },
    InsertColumn { grid: u8, after: u8 },
    DeleteColumn { grid: u8, col: u8 },
    Move { grid: u8, from: (u8, u8), to: (u8, u8) },
    RowHeight { grid: u8, row: u8, multiplier: u8 },
    Place { grid: u8, row: u8, col: u8 },
    AddGrid { rows: u8, cols: u8 },
    Reparent { node: u8, parent: u8 },
    Remove { node: u8, vacate: bool },
}

fn pick(ids: &[NodeId], index: u8) -> Option<NodeId> {
    (!ids.is_empty()).then(|| ids[usize::from(index) % ids.len()])
}

// Coordinates may land one past the edge so out-of-range paths are covered.
fn coord(grid: &GridSpec, row: u8, col: u8) -> CellCoord {
    CellCoord::new(
        u32::from(row) % (grid.rows + 1),
        u32::from(col) % (grid.cols + 1),
    )
}

fn to_operation(forest: &Forest, step: &Step) -> Option<LayoutOperation> {
    let grids: Vec<NodeId> = forest
        .nodes()
        .filter(|node| node.kind.grid_spec().is_some())
        .map(|node| node.id)
        .collect();
    let all: Vec<NodeId> = forest.nodes().map(|node| node.id).collect();
    let grid_of = |index: u8| {
        let id = pick(&grids, index)?;
        Some((id, forest.grid(id).ok()?))
    };

    let operation = match *step {
        Step::Split { grid, row, col, vertical, count } => {
            let (id, shape) = grid_of(grid)?;
            LayoutOperation::SplitCell {
                grid: id,
                cell: coord(shape, row, col),
                axis: if vertical { SplitAxis::Vertical } else { SplitAxis::Horizontal },
                count: u32::from(count % 6),
            }
        }
        Step::Merge { grid, top, left, height, width } => {
            let (id, shape) = grid_of(grid)?;
            let origin = coord(shape, top, left);
            let cells = (0..u32::from(height % 3) + 1)
                .flat_map(|dr| {
                    (0..u32::from(width % 3) + 1)
                        .map(move |dc| CellCoord::new(origin.row + dr, origin.col + dc))
                })
                .collect();
            LayoutOperation::MergeCells { grid: id, cells, keep: None }
        }
        Step::InsertRow { grid, after } => {
            let (id, shape) = grid_of(grid)?;
            LayoutOperation::InsertRow { grid: id, after: u32::from(after) % (shape.rows + 2) }
        }
        Step::DeleteRow { grid, row } => {
            let (id, shape) = grid_of(grid)?;
            LayoutOperation::DeleteRow { grid: id, row: u32::from(row) % (shape.rows + 2) }
        }
        Step::InsertColumn { grid, after } => {
            let (id, shape) = grid_of(grid)?;
            LayoutOperation::InsertColumn { grid: id, after: u32::from(after) % (shape.cols + 2) }
        }
        Step::DeleteColumn { grid, col } => {
            let (id, shape) = grid_of(grid)?;
            LayoutOperation::DeleteColumn { grid: id, col: u32::from(col) % (shape.cols + 2) }
        }
        Step::Move { grid, from, to } => {
            let (id, shape) = grid_of(grid)?;
            LayoutOperation::MoveOccupant {
                grid: id,
                from: coord(shape, from.0, from.1),
                to: coord(shape, to.0, to.1),
            }
        }
        Step::RowHeight { grid, row, multiplier } => {
            let (id, shape) = grid_of(grid)?;
            LayoutOperation::ChangeRowHeight {
                grid: id,
                row: u32::from(row) % (shape.rows + 1),
                multiplier: u32::from(multiplier % 5),
            }
        }
        Step::Place { grid, row, col } => {
            let (id, shape) = grid_of(grid)?;
            LayoutOperation::PlaceInCell {
                grid: id,
                cell: coord(shape, row, col),
                node: LayoutNodeKind::widget("fuzz"),
            }
        }
        Step::AddGrid { rows, cols } => {
            let shape = GridSpec::new(u32::from(rows % 4) + 1, u32::from(cols % 4) + 1).ok()?;
            LayoutOperation::AddChild {
                parent: pick(&all, 0)?,
                node: LayoutNodeKind::grid(shape),
            }
        }
        Step::Reparent { node, parent } => LayoutOperation::Reparent {
            target: pick(&all, node)?,
            new_parent: pick(&all, parent)?,
        },
        Step::Remove { node, vacate } => LayoutOperation::RemoveNode {
            target: pick(&all, node)?,
            vacate_cells: vacate,
        },
    };
    Some(operation)
}

fuzz_target!(|steps: Vec<Step>| {
    // Cap length to keep fuzzing fast.
    if steps.len() > 64 {
        return;
    }
    let Ok((forest, root)) = Forest::new().add_root(LayoutNodeKind::workspace(Direction::Row))
    else {
        return;
    };
    let Ok((mut forest, _)) = forest.add_child(
        root,
        LayoutNodeKind::grid(GridSpec::new(2, 2).expect("valid dimensions")),
    ) else {
        return;
    };

    for (index, step) in steps.iter().enumerate() {
        let Some(operation) = to_operation(&forest, step) else {
            continue;
        };
        let before = forest.state_hash();
        match forest.apply_operation(index as u64 + 1, &operation) {
            Ok((next, outcome)) => {
                assert_eq!(outcome.before_hash, before);
                assert_eq!(outcome.after_hash, next.state_hash());
                forest = next;
            }
            Err(err) => assert_eq!(err.before_hash, before, "rejected op must not mutate"),
        }

        // Every accepted state is valid and survives a JSON round trip.
        forest.validate().expect("forest stays valid");
        let snapshot = forest.to_snapshot();
        assert!(!snapshot.invariant_report().has_errors());
        let json = serde_json::to_string(&snapshot).expect("serialize");
        let back = serde_json::from_str(&json).expect("deserialize");
        let restored = Forest::from_snapshot(back).expect("restore");
        assert_eq!(restored.state_hash(), forest.state_hash());
    }
});

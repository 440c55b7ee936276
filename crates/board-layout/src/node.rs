//! Layout node records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::grid::GridSpec;
use crate::id::{NodeId, parent_sentinel};

/// Main-axis direction of a flex-style container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Row,
    Col,
}

impl Direction {
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Row => Self::Col,
            Self::Col => Self::Row,
        }
    }
}

/// Kind-specific payload of a layout node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum LayoutNodeKind {
    /// Leaf widget; `component_ref` is an opaque registry reference.
    Widget {
        component_ref: String,
        #[serde(default)]
        selected_providers: BTreeMap<String, String>,
    },
    Workspace {
        #[serde(default)]
        direction: Direction,
    },
    Layout {
        #[serde(default)]
        direction: Direction,
    },
    /// Container whose children are addressed through grid cells.
    Grid { grid: GridSpec },
}

impl LayoutNodeKind {
    #[must_use]
    pub fn widget(component_ref: impl Into<String>) -> Self {
        Self::Widget {
            component_ref: component_ref.into(),
            selected_providers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn layout(direction: Direction) -> Self {
        Self::Layout { direction }
    }

    #[must_use]
    pub const fn workspace(direction: Direction) -> Self {
        Self::Workspace { direction }
    }

    #[must_use]
    pub const fn grid(grid: GridSpec) -> Self {
        Self::Grid { grid }
    }

    /// Whether nodes of this kind may have children.
    #[must_use]
    pub const fn is_container(&self) -> bool {
        !matches!(self, Self::Widget { .. })
    }

    #[must_use]
    pub const fn direction(&self) -> Option<Direction> {
        match self {
            Self::Workspace { direction } | Self::Layout { direction } => Some(*direction),
            Self::Widget { .. } | Self::Grid { .. } => None,
        }
    }

    #[must_use]
    pub const fn grid_spec(&self) -> Option<&GridSpec> {
        match self {
            Self::Grid { grid } => Some(grid),
            _ => None,
        }
    }

    #[must_use]
    pub fn component_ref(&self) -> Option<&str> {
        match self {
            Self::Widget { component_ref, .. } => Some(component_ref),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Widget { .. } => "widget",
            Self::Workspace { .. } => "workspace",
            Self::Layout { .. } => "layout",
            Self::Grid { .. } => "grid",
        }
    }
}

/// One node of the layout forest.
///
/// Children point at their parent; a `None` parent marks a root and is
/// persisted as `0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutNode {
    pub id: NodeId,
    #[serde(default, with = "parent_sentinel")]
    pub parent: Option<NodeId>,
    /// Dense rank among siblings, starting at 1.
    #[serde(default)]
    pub order: u32,
    #[serde(flatten)]
    pub kind: LayoutNodeKind,
}

impl LayoutNode {
    #[must_use]
    pub fn new(id: NodeId, parent: Option<NodeId>, order: u32, kind: LayoutNodeKind) -> Self {
        Self {
            id,
            parent,
            order,
            kind,
        }
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[must_use]
    pub const fn is_widget(&self) -> bool {
        !self.kind.is_container()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{CellCoord, CellDef};

    fn id(raw: u64) -> NodeId {
        NodeId::new(raw).expect("test id must be non-zero")
    }

    #[test]
    fn widget_record_uses_flat_camel_case_fields() {
        let mut kind = LayoutNodeKind::widget("chart.line");
        if let LayoutNodeKind::Widget {
            selected_providers, ..
        } = &mut kind
        {
            let _ = selected_providers.insert("metrics".to_string(), "prom-main".to_string());
        }
        let node = LayoutNode::new(id(4), Some(id(2)), 1, kind);
        let json = serde_json::to_value(&node).expect("node should serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "id": 4,
                "parent": 2,
                "order": 1,
                "kind": "widget",
                "componentRef": "chart.line",
                "selectedProviders": {"metrics": "prom-main"},
            })
        );
        let back: LayoutNode = serde_json::from_value(json).expect("node should deserialize");
        assert_eq!(back, node);
    }

    #[test]
    fn root_parent_is_persisted_as_zero() {
        let node = LayoutNode::new(id(1), None, 1, LayoutNodeKind::workspace(Direction::Col));
        let json = serde_json::to_value(&node).expect("node should serialize");
        assert_eq!(json["parent"], serde_json::json!(0));
        assert_eq!(json["direction"], serde_json::json!("col"));

        let back: LayoutNode =
            serde_json::from_str(r#"{"id": 1, "kind": "layout"}"#).expect("defaults apply");
        assert!(back.is_root());
        assert_eq!(back.kind.direction(), Some(Direction::Row));
    }

    #[test]
    fn grid_node_round_trips_with_inline_cells() {
        let mut grid = GridSpec::new(2, 2).expect("valid dimensions");
        let _ = grid.cells.insert(CellCoord::new(2, 1), CellDef::occupied(id(9)));
        let _ = grid.row_heights.insert(2, 3);
        let node = LayoutNode::new(id(3), Some(id(1)), 2, LayoutNodeKind::grid(grid));

        let json = serde_json::to_string(&node).expect("node should serialize");
        assert!(json.contains(r#""2.1":{"component":9"#));
        let back: LayoutNode = serde_json::from_str(&json).expect("node should deserialize");
        assert_eq!(back, node);
        assert!(back.kind.is_container());
        assert_eq!(back.kind.name(), "grid");
    }
}

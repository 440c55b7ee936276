//! Sparse 2-D cell model attached to grid-kind layout nodes.
//!
//! A [`GridSpec`] stores only the cells that differ from the default (empty,
//! visible, unspanned). Multi-cell regions are expressed by a visible origin
//! cell declaring a [`CellSpan`]; every other coordinate it covers is a
//! hidden slave whose *span owner* is that origin.
//!
//! Coordinates are 1-based. They are native [`CellCoord`] keys in memory and
//! `"row.col"` strings only when serialized.

mod ops;
mod repair;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{GridError, GridIssue, InvalidCellReason};
use crate::id::NodeId;

pub use ops::is_rectangular_selection;
pub use repair::GridRepair;

/// Smallest number of parts a cell can be split into.
pub const MIN_SPLIT_COUNT: u32 = 2;

/// Largest number of parts a cell can be split into.
pub const MAX_SPLIT_COUNT: u32 = 4;

/// Default pixel height of one row multiplier unit.
pub const DEFAULT_ROW_UNIT: u32 = 80;

/// Structural axis of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridAxis {
    Row,
    Column,
}

impl GridAxis {
    /// The perpendicular axis.
    #[must_use]
    pub const fn cross(self) -> Self {
        match self {
            Self::Row => Self::Column,
            Self::Column => Self::Row,
        }
    }
}

impl fmt::Display for GridAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Row => write!(f, "row"),
            Self::Column => write!(f, "column"),
        }
    }
}

/// Direction of a cell split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitAxis {
    /// Side-by-side parts (new columns).
    Horizontal,
    /// Stacked parts (new rows).
    Vertical,
}

impl SplitAxis {
    /// Grid axis along which the parts are laid out.
    #[must_use]
    pub const fn line_axis(self) -> GridAxis {
        match self {
            Self::Horizontal => GridAxis::Column,
            Self::Vertical => GridAxis::Row,
        }
    }
}

/// 1-based grid coordinate, ordered row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellCoord {
    pub row: u32,
    pub col: u32,
}

impl CellCoord {
    #[must_use]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Position along `axis`.
    #[must_use]
    pub const fn along(self, axis: GridAxis) -> u32 {
        match axis {
            GridAxis::Row => self.row,
            GridAxis::Column => self.col,
        }
    }

    pub(crate) const fn from_axis(axis: GridAxis, along: u32, across: u32) -> Self {
        match axis {
            GridAxis::Row => Self::new(along, across),
            GridAxis::Column => Self::new(across, along),
        }
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.row, self.col)
    }
}

/// Failure to parse a `"row.col"` coordinate key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellCoordParseError {
    pub input: String,
}

impl fmt::Display for CellCoordParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid cell coordinate {:?} (expected \"row.col\")", self.input)
    }
}

impl std::error::Error for CellCoordParseError {}

impl FromStr for CellCoord {
    type Err = CellCoordParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let err = || CellCoordParseError {
            input: input.to_string(),
        };
        let (row, col) = input.split_once('.').ok_or_else(err)?;
        let row = row.trim().parse::<u32>().map_err(|_| err())?;
        let col = col.trim().parse::<u32>().map_err(|_| err())?;
        Ok(Self::new(row, col))
    }
}

impl Serialize for CellCoord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CellCoord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CoordVisitor;

        impl Visitor<'_> for CoordVisitor {
            type Value = CellCoord;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a \"row.col\" cell coordinate")
            }

            fn visit_str<E>(self, value: &str) -> Result<CellCoord, E>
            where
                E: de::Error,
            {
                value.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(CoordVisitor)
    }
}

/// Extent of a spanning cell in rows and columns (both >= 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellSpan {
    pub row: u32,
    pub col: u32,
}

impl CellSpan {
    /// A single coordinate.
    pub const UNIT: Self = Self { row: 1, col: 1 };

    #[must_use]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Extent along `axis`.
    #[must_use]
    pub const fn along(self, axis: GridAxis) -> u32 {
        match axis {
            GridAxis::Row => self.row,
            GridAxis::Column => self.col,
        }
    }

    pub(crate) const fn from_axis(axis: GridAxis, along: u32, across: u32) -> Self {
        match axis {
            GridAxis::Row => Self::new(along, across),
            GridAxis::Column => Self::new(across, along),
        }
    }

    #[must_use]
    pub const fn is_unit(self) -> bool {
        self.row == 1 && self.col == 1
    }

    /// `None` for a unit span, so cell maps stay minimal.
    #[must_use]
    pub const fn normalized(self) -> Option<Self> {
        if self.is_unit() { None } else { Some(self) }
    }
}

impl Default for CellSpan {
    fn default() -> Self {
        Self::UNIT
    }
}

/// Definition of one grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CellDef {
    /// Weak reference to the occupying layout node.
    #[serde(default)]
    pub component: Option<NodeId>,
    /// Covered by another cell's span.
    #[serde(default)]
    pub hide: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<CellSpan>,
}

impl CellDef {
    /// A slave coordinate covered by some span owner.
    #[must_use]
    pub const fn hidden() -> Self {
        Self {
            component: None,
            hide: true,
            span: None,
        }
    }

    /// A visible cell holding `node`.
    #[must_use]
    pub const fn occupied(node: NodeId) -> Self {
        Self {
            component: Some(node),
            hide: false,
            span: None,
        }
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Inclusive rectangle of grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRect {
    pub top: u32,
    pub left: u32,
    pub bottom: u32,
    pub right: u32,
}

impl CellRect {
    /// Rectangle covered by a cell at `origin` with `span`.
    ///
    /// Edges saturate at `u32::MAX`, so a span read from damaged data still
    /// ends past the grid instead of wrapping back into it.
    #[must_use]
    pub fn from_origin(origin: CellCoord, span: CellSpan) -> Self {
        Self {
            top: origin.row,
            left: origin.col,
            bottom: origin.row.saturating_add(span.row.max(1) - 1),
            right: origin.col.saturating_add(span.col.max(1) - 1),
        }
    }

    #[must_use]
    pub const fn origin(&self) -> CellCoord {
        CellCoord::new(self.top, self.left)
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.bottom - self.top + 1
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.right - self.left + 1
    }

    #[must_use]
    pub const fn span(&self) -> CellSpan {
        CellSpan::new(self.height(), self.width())
    }

    #[must_use]
    pub const fn area(&self) -> u64 {
        self.height() as u64 * self.width() as u64
    }

    #[must_use]
    pub const fn contains(&self, coord: CellCoord) -> bool {
        coord.row >= self.top
            && coord.row <= self.bottom
            && coord.col >= self.left
            && coord.col <= self.right
    }

    /// Smallest rectangle containing both.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            top: self.top.min(other.top),
            left: self.left.min(other.left),
            bottom: self.bottom.max(other.bottom),
            right: self.right.max(other.right),
        }
    }

    /// Coordinates in row-major order.
    pub fn coords(self) -> impl Iterator<Item = CellCoord> {
        (self.top..=self.bottom)
            .flat_map(move |row| (self.left..=self.right).map(move |col| CellCoord::new(row, col)))
    }

    pub(crate) const fn start(&self, axis: GridAxis) -> u32 {
        match axis {
            GridAxis::Row => self.top,
            GridAxis::Column => self.left,
        }
    }

    pub(crate) const fn end(&self, axis: GridAxis) -> u32 {
        match axis {
            GridAxis::Row => self.bottom,
            GridAxis::Column => self.right,
        }
    }

    pub(crate) const fn len(&self, axis: GridAxis) -> u32 {
        self.end(axis) - self.start(axis) + 1
    }

    pub(crate) const fn contains_line(&self, axis: GridAxis, index: u32) -> bool {
        index >= self.start(axis) && index <= self.end(axis)
    }
}

impl fmt::Display for CellRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.origin(),
            CellCoord::new(self.bottom, self.right)
        )
    }
}

/// A renderable cell: origin, extent and occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleCell {
    pub coord: CellCoord,
    pub span: CellSpan,
    pub component: Option<NodeId>,
}

fn default_row_unit() -> u32 {
    DEFAULT_ROW_UNIT
}

/// Grid definition carried inline by a grid-kind node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSpec {
    pub rows: u32,
    pub cols: u32,
    #[serde(default = "default_row_unit")]
    pub row_unit: u32,
    /// Sparse row multipliers; rows at the default of 1 are omitted.
    #[serde(default, with = "row_height_keys")]
    pub row_heights: BTreeMap<u32, u32>,
    #[serde(default)]
    pub cells: BTreeMap<CellCoord, CellDef>,
}

impl GridSpec {
    /// Empty `rows x cols` grid.
    pub fn new(rows: u32, cols: u32) -> Result<Self, GridError> {
        if rows == 0 || cols == 0 {
            return Err(GridError::InvalidDimensions { rows, cols });
        }
        Ok(Self {
            rows,
            cols,
            row_unit: DEFAULT_ROW_UNIT,
            row_heights: BTreeMap::new(),
            cells: BTreeMap::new(),
        })
    }

    #[must_use]
    pub fn with_row_unit(mut self, row_unit: u32) -> Self {
        self.row_unit = row_unit;
        self
    }

    /// Number of structural lines along `axis`.
    #[must_use]
    pub const fn extent(&self, axis: GridAxis) -> u32 {
        match axis {
            GridAxis::Row => self.rows,
            GridAxis::Column => self.cols,
        }
    }

    pub(crate) fn set_extent(&mut self, axis: GridAxis, len: u32) {
        match axis {
            GridAxis::Row => self.rows = len,
            GridAxis::Column => self.cols = len,
        }
    }

    #[must_use]
    pub const fn is_in_bounds(&self, coord: CellCoord) -> bool {
        coord.row >= 1 && coord.row <= self.rows && coord.col >= 1 && coord.col <= self.cols
    }

    /// Reject coordinates outside `1..=rows` x `1..=cols`.
    pub fn check_bounds(&self, coord: CellCoord) -> Result<(), GridError> {
        if coord.row == 0 || coord.row > self.rows {
            return Err(GridError::OutOfRange {
                axis: GridAxis::Row,
                index: coord.row,
                len: self.rows,
            });
        }
        if coord.col == 0 || coord.col > self.cols {
            return Err(GridError::OutOfRange {
                axis: GridAxis::Column,
                index: coord.col,
                len: self.cols,
            });
        }
        Ok(())
    }

    /// Cell definition at `coord`; absent entries read as the default.
    #[must_use]
    pub fn cell(&self, coord: CellCoord) -> CellDef {
        self.cells.get(&coord).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn is_hidden(&self, coord: CellCoord) -> bool {
        self.cells.get(&coord).is_some_and(|cell| cell.hide)
    }

    /// Height multiplier of `row` (default 1).
    #[must_use]
    pub fn row_height(&self, row: u32) -> u32 {
        self.row_heights.get(&row).copied().unwrap_or(1)
    }

    /// Rendered pixel height of `row`.
    #[must_use]
    pub fn row_pixel_height(&self, row: u32) -> u64 {
        u64::from(self.row_unit) * u64::from(self.row_height(row))
    }

    /// Rectangle covered by the visible cell at `coord`, `None` if hidden.
    #[must_use]
    pub fn footprint(&self, coord: CellCoord) -> Option<CellRect> {
        let cell = self.cell(coord);
        if cell.hide {
            return None;
        }
        Some(CellRect::from_origin(coord, cell.span.unwrap_or_default()))
    }

    /// Visible cell whose span covers the hidden coordinate `(row, col)`.
    ///
    /// Among covering origins at or above-left of the coordinate, the one
    /// with the greatest row (then greatest column) wins. Returns `None`
    /// when the coordinate is itself visible or when no owner exists.
    #[must_use]
    pub fn span_owner_of(&self, row: u32, col: u32) -> Option<CellCoord> {
        let target = CellCoord::new(row, col);
        if !self.is_hidden(target) {
            return None;
        }
        self.cells
            .iter()
            .filter(|(origin, cell)| !cell.hide && origin.row <= row && origin.col <= col)
            .filter_map(|(origin, cell)| {
                let span = cell.span?;
                CellRect::from_origin(*origin, span)
                    .contains(target)
                    .then_some(*origin)
            })
            .max()
    }

    /// The coordinate itself when visible, otherwise its span owner.
    pub fn resolve(&self, coord: CellCoord) -> Result<CellCoord, GridError> {
        self.check_bounds(coord)?;
        if !self.is_hidden(coord) {
            return Ok(coord);
        }
        self.span_owner_of(coord.row, coord.col)
            .ok_or(GridError::InvalidCell {
                coord,
                reason: InvalidCellReason::NoSpanOwner,
            })
    }

    /// Whether structural line `index` holds at least one visible cell.
    #[must_use]
    pub fn line_has_visible_cell(&self, axis: GridAxis, index: u32) -> bool {
        if index == 0 || index > self.extent(axis) {
            return false;
        }
        (1..=self.extent(axis.cross()))
            .any(|across| !self.is_hidden(CellCoord::from_axis(axis, index, across)))
    }

    /// Whether `row` is a real row rather than one consumed by spans.
    #[must_use]
    pub fn row_has_visible_cell(&self, row: u32) -> bool {
        self.line_has_visible_cell(GridAxis::Row, row)
    }

    /// Whether `col` is a real column rather than one consumed by spans.
    #[must_use]
    pub fn col_has_visible_cell(&self, col: u32) -> bool {
        self.line_has_visible_cell(GridAxis::Column, col)
    }

    /// Every visible cell in row-major order, including implicit empty ones.
    #[must_use]
    pub fn visible_cells(&self) -> Vec<VisibleCell> {
        let bounds = CellRect {
            top: 1,
            left: 1,
            bottom: self.rows,
            right: self.cols,
        };
        bounds
            .coords()
            .filter_map(|coord| {
                let cell = self.cell(coord);
                (!cell.hide).then(|| VisibleCell {
                    coord,
                    span: cell.span.unwrap_or_default(),
                    component: cell.component,
                })
            })
            .collect()
    }

    /// Coordinate holding `node`, if any.
    #[must_use]
    pub fn find_occupant(&self, node: NodeId) -> Option<CellCoord> {
        self.cells
            .iter()
            .find(|(_, cell)| cell.component == Some(node))
            .map(|(coord, _)| *coord)
    }

    /// All node ids referenced by cells.
    #[must_use]
    pub fn occupants(&self) -> BTreeSet<NodeId> {
        self.cells.values().filter_map(|cell| cell.component).collect()
    }

    /// Every structural defect, in deterministic order.
    #[must_use]
    pub fn consistency_issues(&self) -> Vec<GridIssue> {
        let mut issues = Vec::new();
        if self.rows == 0 || self.cols == 0 {
            issues.push(GridIssue::InvalidDimensions {
                rows: self.rows,
                cols: self.cols,
            });
            return issues;
        }

        for &row in self.row_heights.keys() {
            if row == 0 || row > self.rows {
                issues.push(GridIssue::RowHeightOutOfBounds { row });
            }
        }
        for (&row, &height) in &self.row_heights {
            if height == 0 {
                issues.push(GridIssue::ZeroRowHeight { row });
            }
        }

        let mut covered: BTreeMap<CellCoord, CellCoord> = BTreeMap::new();
        for (&coord, cell) in &self.cells {
            if !self.is_in_bounds(coord) {
                issues.push(GridIssue::CellOutOfBounds { coord });
                continue;
            }
            if cell.hide {
                if cell.component.is_some() || cell.span.is_some() {
                    issues.push(GridIssue::HiddenCellPayload { coord });
                }
                continue;
            }
            let Some(span) = cell.span else {
                continue;
            };
            if span.row == 0 || span.col == 0 {
                issues.push(GridIssue::ZeroSpan { coord });
                continue;
            }
            let rect = CellRect::from_origin(coord, span);
            if rect.bottom > self.rows || rect.right > self.cols {
                issues.push(GridIssue::SpanOutOfBounds { coord, span });
                continue;
            }
            for slave in rect.coords().filter(|slave| *slave != coord) {
                if let Some(previous) = covered.insert(slave, coord) {
                    issues.push(GridIssue::SpanOverlap {
                        coord: slave,
                        owner: previous,
                    });
                } else if !self.is_hidden(slave) {
                    issues.push(GridIssue::SpanOverlap {
                        coord: slave,
                        owner: coord,
                    });
                }
            }
        }

        for (&coord, cell) in &self.cells {
            if cell.hide && self.is_in_bounds(coord) && !covered.contains_key(&coord) {
                issues.push(GridIssue::OrphanHiddenCell { coord });
            }
        }

        issues
    }

    /// Fail on the first structural defect.
    pub fn validate(&self) -> Result<(), GridError> {
        match self.consistency_issues().into_iter().next() {
            Some(issue) => Err(GridError::Inconsistent(issue)),
            None => Ok(()),
        }
    }

    pub(crate) fn put(&mut self, coord: CellCoord, cell: CellDef) {
        if cell.is_default() {
            let _ = self.cells.remove(&coord);
        } else {
            let _ = self.cells.insert(coord, cell);
        }
    }
}

mod row_height_keys {
    //! Row multipliers keyed by row number, persisted with string keys.
    //!
    //! Keys are parsed by hand so the map also loads when buffered inside a
    //! tagged enum, where integer map keys arrive as strings.

    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(heights: &BTreeMap<u32, u32>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(heights.iter().map(|(row, height)| (row.to_string(), height)))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<u32, u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, u32>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(row, height)| {
                row.trim()
                    .parse::<u32>()
                    .map(|row| (row, height))
                    .map_err(|_| D::Error::custom(format!("invalid row key {row:?}")))
            })
            .collect()
    }
}

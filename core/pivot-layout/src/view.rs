//! FILENAME: core/pivot-layout/src/view.rs
//! Cell View - what the renderer asks for one (row leaf, column leaf) pair.
//!
//! Also holds the sizing seam: header cells are measured by a `SizingPolicy`
//! so the renderer can plug in its own text metrics.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::data::{DataRow, DataSourceId, DataValue, Query};
use crate::definition::HierarchyType;
use crate::hierarchy::{Axis, Node, NodeKey};

// ============================================================================
// VIEW META
// ============================================================================

/// Resolved data of one body cell.
#[derive(Debug, Clone, Serialize)]
pub struct ViewMeta<'a> {
    pub row_index: usize,
    pub col_index: usize,

    pub row_key: NodeKey,
    pub col_key: NodeKey,
    pub row_id: &'a str,
    pub col_id: &'a str,

    /// Data set the rows below come from.
    pub source: DataSourceId,

    /// Indices of the rows matching both leaves, ascending.
    pub row_indices: Vec<usize>,

    /// The rows matching both leaves.
    pub data: Vec<&'a DataRow>,

    /// Measure shown in the cell.
    pub value_field: String,

    /// The measure value; `None` when no row carries a value.
    pub field_value: Option<DataValue>,

    /// Derived metrics of the measure, in declared order.
    pub derived_values: Vec<(String, Option<DataValue>)>,

    /// Either leaf is a grand total or subtotal.
    pub is_totals: bool,

    pub row_query: &'a Query,
    pub col_query: &'a Query,

    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewMeta<'_> {
    /// No row backs this cell.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The cell value as a number, if it is one.
    pub fn number(&self) -> Option<f64> {
        self.field_value.as_ref().and_then(|v| v.as_number())
    }
}

// ============================================================================
// SIZING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CellSize {
    pub width: f64,
    pub height: f64,
}

impl CellSize {
    pub fn new(width: f64, height: f64) -> Self {
        CellSize { width, height }
    }
}

/// Measures header nodes.
///
/// Along a row header only the height feeds the leaf positions and only the
/// width feeds the level column; the reverse holds for the column header.
pub trait SizingPolicy {
    fn node_size(&self, node: &Node, axis: Axis, hierarchy_type: HierarchyType) -> CellSize;
}

impl<F> SizingPolicy for F
where
    F: Fn(&Node, Axis) -> CellSize,
{
    fn node_size(&self, node: &Node, axis: Axis, _hierarchy_type: HierarchyType) -> CellSize {
        self(node, axis)
    }
}

/// Fixed sizes with per-field and per-value overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultSizing {
    pub cell_width: f64,
    pub cell_height: f64,

    /// Width of a row header level.
    pub row_width: f64,
    /// Width of the single tree-mode row header column.
    pub tree_rows_width: f64,
    /// Row header level widths by field.
    pub width_by_field: FxHashMap<String, f64>,
    /// Row heights by field.
    pub row_height_by_field: FxHashMap<String, f64>,

    /// Height of a column header level.
    pub col_height: f64,
    /// Column header level heights by field.
    pub height_by_field: FxHashMap<String, f64>,
    /// Column widths by node value.
    pub width_by_field_value: FxHashMap<String, f64>,
    /// Measure column headers take no height.
    pub hide_measure_column: bool,
}

impl Default for DefaultSizing {
    fn default() -> Self {
        DefaultSizing {
            cell_width: 96.0,
            cell_height: 30.0,
            row_width: 96.0,
            tree_rows_width: 120.0,
            width_by_field: FxHashMap::default(),
            row_height_by_field: FxHashMap::default(),
            col_height: 30.0,
            height_by_field: FxHashMap::default(),
            width_by_field_value: FxHashMap::default(),
            hide_measure_column: false,
        }
    }
}

impl SizingPolicy for DefaultSizing {
    fn node_size(&self, node: &Node, axis: Axis, hierarchy_type: HierarchyType) -> CellSize {
        match axis {
            Axis::Row => {
                let width = match hierarchy_type {
                    HierarchyType::Tree => self.tree_rows_width,
                    HierarchyType::Grid => self
                        .width_by_field
                        .get(&node.field)
                        .copied()
                        .unwrap_or(self.row_width),
                };
                let height = self
                    .row_height_by_field
                    .get(&node.field)
                    .copied()
                    .unwrap_or(self.cell_height);
                CellSize::new(width, height)
            }
            Axis::Col => {
                let width = self
                    .width_by_field_value
                    .get(&node.value)
                    .copied()
                    .unwrap_or(self.cell_width);
                let height = if self.hide_measure_column && node.is_measure() {
                    0.0
                } else {
                    self.height_by_field
                        .get(&node.field)
                        .copied()
                        .unwrap_or(self.col_height)
                };
                CellSize::new(width, height)
            }
        }
    }
}

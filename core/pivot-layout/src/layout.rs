//! FILENAME: core/pivot-layout/src/layout.rs
//! Layout Result - both axis trees plus everything needed to answer cell
//! queries against them.
//!
//! The assembler projects each hierarchy (leaf order, per-level lists,
//! indices) and assigns header geometry. Row geometry runs along y, column
//! geometry along x; a header's cross extent stacks one level per field.

use std::fmt;
use std::ops::Range;

use crate::builder::collapse_flag;
use crate::data::{aggregate_rows, intersect_sorted, DataSet, DataSourceId, DataValue};
use crate::definition::{Aggregation, CollapseState, HierarchyType, LayoutOptions, PivotLayoutConfig};
use crate::error::{LayoutWarning, PivotError, Result};
use crate::fields::ResolvedFields;
use crate::hierarchy::{Axis, Hierarchy, Node, NodeKey};
use crate::view::{CellSize, SizingPolicy, ViewMeta};

// ============================================================================
// ASSEMBLER
// ============================================================================

/// Projects a hierarchy and lays out its header cells.
pub struct LayoutResultAssembler<'a> {
    sizing: &'a dyn SizingPolicy,
    hierarchy_type: HierarchyType,
}

impl<'a> LayoutResultAssembler<'a> {
    pub fn new(sizing: &'a dyn SizingPolicy, hierarchy_type: HierarchyType) -> Self {
        LayoutResultAssembler {
            sizing,
            hierarchy_type,
        }
    }

    pub fn assemble(&self, hierarchy: &mut Hierarchy) {
        hierarchy.project();
        self.assign_geometry(hierarchy);
    }

    /// Positions every visible node. Hidden nodes keep stale geometry.
    pub fn assign_geometry(&self, hierarchy: &mut Hierarchy) {
        let mut offset = 0.0;
        let mut max_cross: f64 = 0.0;
        let top: Vec<NodeKey> = hierarchy.root().children.clone();
        for key in top {
            self.place(hierarchy, key, 0.0, &mut offset, &mut max_cross);
        }

        // Shallow leaves (totals, collapsed nodes) span the remaining levels.
        if !hierarchy.index_every_node() {
            let axis = hierarchy.axis();
            let leaves = hierarchy.leaf_nodes().to_vec();
            for key in leaves {
                let node = hierarchy.node_mut(key);
                match axis {
                    Axis::Row => node.width = max_cross - node.x,
                    Axis::Col => node.height = max_cross - node.y,
                }
            }
        }
    }

    fn place(
        &self,
        hierarchy: &mut Hierarchy,
        key: NodeKey,
        cross: f64,
        offset: &mut f64,
        max_cross: &mut f64,
    ) {
        let axis = hierarchy.axis();
        let tree = hierarchy.index_every_node();
        let size = self.sizing.node_size(hierarchy.node(key), axis, self.hierarchy_type);
        let (main_size, cross_size) = match axis {
            Axis::Row => (size.height, size.width),
            Axis::Col => (size.width, size.height),
        };
        let children: Vec<NodeKey> = {
            let node = hierarchy.node(key);
            if node.is_collapsed {
                Vec::new()
            } else {
                node.children.clone()
            }
        };
        *max_cross = max_cross.max(cross + cross_size);

        let start = *offset;
        let extent = if tree {
            // Tree rows: one line per node, children indented in the same column.
            *offset += main_size;
            for child in children {
                self.place(hierarchy, child, cross, offset, max_cross);
            }
            main_size
        } else if children.is_empty() {
            *offset += main_size;
            main_size
        } else {
            for child in children {
                self.place(hierarchy, child, cross + cross_size, offset, max_cross);
            }
            *offset - start
        };

        let node = hierarchy.node_mut(key);
        match axis {
            Axis::Row => {
                node.x = cross;
                node.width = cross_size;
                node.y = start;
                node.height = extent;
            }
            Axis::Col => {
                node.y = cross;
                node.height = cross_size;
                node.x = start;
                node.width = extent;
            }
        }
    }
}

/// Re-derives every node's collapse flag from `options`.
fn apply_collapse(options: &LayoutOptions, resolved: &ResolvedFields, hierarchy: &mut Hierarchy) {
    let axis = hierarchy.axis();
    let keys: Vec<NodeKey> = hierarchy.nodes().map(|n| n.key).collect();
    for key in keys {
        let flag = {
            let node = hierarchy.node(key);
            let measure = node.is_measure().then_some(node.value.as_str());
            collapse_flag(options, resolved, axis, &node.id, measure, !node.children.is_empty())
        };
        hierarchy.node_mut(key).is_collapsed = flag;
    }
}

// ============================================================================
// LAYOUT RESULT
// ============================================================================

/// The built layout: both axis trees and the data they index into.
pub struct LayoutResult {
    pub(crate) config: PivotLayoutConfig,
    pub(crate) resolved: ResolvedFields,
    pub(crate) rows: Hierarchy,
    pub(crate) cols: Hierarchy,
    /// Indexed by `DataSourceId`; slot 0 is the base data.
    pub(crate) sources: Vec<DataSet>,
    /// Drill slots released by `clear`, reused before `sources` grows.
    pub(crate) free_sources: Vec<DataSourceId>,
    pub(crate) sizing: Box<dyn SizingPolicy>,
    pub(crate) warnings: Vec<LayoutWarning>,
}

impl fmt::Debug for LayoutResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutResult")
            .field("rows", &self.rows.leaf_count())
            .field("cols", &self.cols.leaf_count())
            .field("sources", &self.sources.len())
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

impl LayoutResult {
    pub(crate) fn new(
        config: PivotLayoutConfig,
        resolved: ResolvedFields,
        rows: Hierarchy,
        cols: Hierarchy,
        data: DataSet,
        sizing: Box<dyn SizingPolicy>,
        warnings: Vec<LayoutWarning>,
    ) -> Self {
        let mut result = LayoutResult {
            config,
            resolved,
            rows,
            cols,
            sources: vec![data],
            free_sources: Vec::new(),
            sizing,
            warnings,
        };
        result.reassemble();
        result
    }

    pub fn config(&self) -> &PivotLayoutConfig {
        &self.config
    }

    pub fn resolved_fields(&self) -> &ResolvedFields {
        &self.resolved
    }

    pub fn row_hierarchy(&self) -> &Hierarchy {
        &self.rows
    }

    pub fn col_hierarchy(&self) -> &Hierarchy {
        &self.cols
    }

    pub fn hierarchy(&self, axis: Axis) -> &Hierarchy {
        match axis {
            Axis::Row => &self.rows,
            Axis::Col => &self.cols,
        }
    }

    /// Row leaves in display order.
    pub fn row_leaf_nodes(&self) -> Vec<&Node> {
        self.rows.leaf_nodes().iter().map(|&k| self.rows.node(k)).collect()
    }

    /// Column leaves in display order.
    pub fn col_leaf_nodes(&self) -> Vec<&Node> {
        self.cols.leaf_nodes().iter().map(|&k| self.cols.node(k)).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.leaf_count()
    }

    pub fn col_count(&self) -> usize {
        self.cols.leaf_count()
    }

    /// The data set handed to the build.
    pub fn data(&self) -> &DataSet {
        &self.sources[0]
    }

    pub fn source(&self, id: DataSourceId) -> Option<&DataSet> {
        self.sources.get(id.0 as usize)
    }

    /// Non-fatal problems met while building (and drilling).
    pub fn warnings(&self) -> &[LayoutWarning] {
        &self.warnings
    }

    /// Extent of the body: summed column widths and row heights.
    pub fn content_size(&self) -> CellSize {
        let width = self.col_leaf_nodes().iter().map(|n| n.width).sum();
        let height = self.row_leaf_nodes().iter().map(|n| n.height).sum();
        CellSize::new(width, height)
    }

    // ------------------------------------------------------------------------
    // CELL LOOKUP
    // ------------------------------------------------------------------------

    /// Resolves the cell at (`row_index`, `col_index`).
    ///
    /// Returns `Ok(None)` when no measure is configured; an index past the
    /// leaf sequence is an error.
    pub fn get_view_meta(&self, row_index: usize, col_index: usize) -> Result<Option<ViewMeta<'_>>> {
        let row = self.rows.leaf(row_index).ok_or(PivotError::IndexOutOfRange {
            axis: Axis::Row,
            index: row_index,
            len: self.rows.leaf_count(),
        })?;
        let col = self.cols.leaf(col_index).ok_or(PivotError::IndexOutOfRange {
            axis: Axis::Col,
            index: col_index,
            len: self.cols.leaf_count(),
        })?;

        let Some(value_field) = row
            .query
            .measure()
            .or_else(|| col.query.measure())
            .or_else(|| self.resolved.implicit_measure().map(str::to_string))
            // A collapsed or tree-mode parent of measure nodes shows the first measure.
            .or_else(|| self.resolved.measure_axis.and(self.resolved.measures.first().cloned()))
        else {
            return Ok(None);
        };

        // Columns always index the base data; drilled rows bring their own set.
        let source = row.source;
        let Some(data) = self.source(source) else {
            return Ok(None);
        };
        let row_indices = match (&row.rows, &col.rows) {
            (Some(a), Some(b)) if row.source == col.source => intersect_sorted(a, b),
            _ => data.matching(&[&row.query, &col.query]),
        };

        let is_totals = row.is_totals() || col.is_totals();
        let (field_value, derived_values) = if is_totals {
            let (total, other) = if row.is_totals() { (row, col) } else { (col, row) };
            let aggregation = total.aggregation.unwrap_or_default();
            let value = if other.query.has_dimension_filter() {
                aggregate_rows(data, &row_indices, &value_field, aggregation)
            } else {
                total.aggregate(&value_field)
            };
            let derived = self
                .resolved
                .derived_for(&value_field)
                .iter()
                .map(|d| {
                    let v = aggregate_rows(data, &row_indices, d, aggregation).map(DataValue::from);
                    (d.clone(), v)
                })
                .collect();
            (value.map(DataValue::from), derived)
        } else {
            let aggregation = self
                .config
                .meta_for(&value_field)
                .and_then(|m| m.aggregation)
                .unwrap_or_default();
            let value = cell_value(data, &row_indices, &value_field, aggregation);
            let derived = self
                .resolved
                .derived_for(&value_field)
                .iter()
                .map(|d| (d.clone(), cell_value(data, &row_indices, d, Aggregation::Sum)))
                .collect();
            (value, derived)
        };

        Ok(Some(ViewMeta {
            row_index,
            col_index,
            row_key: row.key,
            col_key: col.key,
            row_id: &row.id,
            col_id: &col.id,
            source,
            data: row_indices.iter().filter_map(|&i| data.row(i)).collect(),
            row_indices,
            value_field,
            field_value,
            derived_values,
            is_totals,
            row_query: &row.query,
            col_query: &col.query,
            x: col.x,
            y: row.y,
            width: col.width,
            height: row.height,
        }))
    }

    // ------------------------------------------------------------------------
    // PAGINATION
    // ------------------------------------------------------------------------

    /// Number of row pages; 1 without pagination.
    pub fn page_count(&self) -> usize {
        match self.config.options.pagination.filter(|p| p.page_size > 0) {
            Some(p) => self.rows.leaf_count().div_ceil(p.page_size).max(1),
            None => 1,
        }
    }

    /// Row leaf indices of the current page.
    pub fn page_row_range(&self) -> Range<usize> {
        let len = self.rows.leaf_count();
        match self.config.options.pagination.filter(|p| p.page_size > 0) {
            Some(p) => {
                let start = p.current.saturating_sub(1).saturating_mul(p.page_size).min(len);
                let end = start.saturating_add(p.page_size).min(len);
                start..end
            }
            None => 0..len,
        }
    }

    // ------------------------------------------------------------------------
    // COLLAPSE & GEOMETRY
    // ------------------------------------------------------------------------

    /// Replaces both collapse maps and re-projects. Collapsing and expanding
    /// again restores the previous leaf sequence exactly.
    pub fn apply_collapse_state(&mut self, rows: CollapseState, cols: CollapseState) {
        self.config.options.collapsed_rows = rows;
        self.config.options.collapsed_cols = cols;
        apply_collapse(&self.config.options, &self.resolved, &mut self.rows);
        apply_collapse(&self.config.options, &self.resolved, &mut self.cols);
        self.reassemble();
    }

    /// Flips the collapse flag of one node; returns the new flag.
    pub fn toggle_collapse(&mut self, axis: Axis, id: &str) -> Result<bool> {
        let hierarchy = match axis {
            Axis::Row => &mut self.rows,
            Axis::Col => &mut self.cols,
        };
        let key = hierarchy
            .key_of(id)
            .ok_or_else(|| PivotError::UnknownNode(id.to_string()))?;
        let node = hierarchy.node_mut(key);
        node.is_collapsed = !node.is_collapsed;
        let collapsed = node.is_collapsed;

        let state = match axis {
            Axis::Row => &mut self.config.options.collapsed_rows,
            Axis::Col => &mut self.config.options.collapsed_cols,
        };
        state.insert(id.to_string(), collapsed);
        self.reassemble_axis(axis);
        Ok(collapsed)
    }

    /// Recomputes geometry with a new sizing policy.
    pub fn relayout(&mut self, sizing: Box<dyn SizingPolicy>) {
        self.sizing = sizing;
        let assembler = LayoutResultAssembler::new(self.sizing.as_ref(), self.resolved.hierarchy_type);
        assembler.assign_geometry(&mut self.rows);
        assembler.assign_geometry(&mut self.cols);
    }

    /// Geometry only; the projection of `axis` is assumed current.
    pub(crate) fn relayout_axis(&mut self, axis: Axis) {
        let assembler = LayoutResultAssembler::new(self.sizing.as_ref(), self.resolved.hierarchy_type);
        match axis {
            Axis::Row => assembler.assign_geometry(&mut self.rows),
            Axis::Col => assembler.assign_geometry(&mut self.cols),
        }
    }

    /// Stores a drill-down data set, reusing a released slot if there is one.
    pub(crate) fn store_source(&mut self, data: DataSet) -> DataSourceId {
        match self.free_sources.pop() {
            Some(id) => {
                self.sources[id.0 as usize] = data;
                id
            }
            None => {
                self.sources.push(data);
                DataSourceId((self.sources.len() - 1) as u32)
            }
        }
    }

    /// Empties a drill-down slot and marks it for reuse.
    pub(crate) fn release_source(&mut self, id: DataSourceId) {
        if id != DataSourceId::BASE && (id.0 as usize) < self.sources.len() {
            self.sources[id.0 as usize] = DataSet::default();
            self.free_sources.push(id);
        }
    }

    pub(crate) fn reassemble(&mut self) {
        self.reassemble_axis(Axis::Row);
        self.reassemble_axis(Axis::Col);
    }

    fn reassemble_axis(&mut self, axis: Axis) {
        let assembler = LayoutResultAssembler::new(self.sizing.as_ref(), self.resolved.hierarchy_type);
        match axis {
            Axis::Row => assembler.assemble(&mut self.rows),
            Axis::Col => assembler.assemble(&mut self.cols),
        }
    }
}

/// Value of a detail cell: the raw value of a single row, an aggregate of
/// several.
fn cell_value(data: &DataSet, indices: &[usize], field: &str, aggregation: Aggregation) -> Option<DataValue> {
    match indices {
        [] => None,
        [only] => data
            .row(*only)
            .map(|r| r.get(field))
            .filter(|v| !v.is_empty())
            .cloned(),
        _ => aggregate_rows(data, indices, field, aggregation).map(DataValue::from),
    }
}

//! FILENAME: core/pivot-layout/src/totals.rs
//! Totals Injector - grand total and subtotal nodes.
//!
//! Totals are additive: every aggregate is computed from the base rows of the
//! node's scope, never from already-aggregated children.

use smallvec::SmallVec;

use crate::data::{aggregate_rows, DataSet, DataValue};
use crate::definition::{HierarchyType, PivotLayoutConfig, Total, EXTRA_FIELD, SUBTOTAL_VALUE, TOTAL_VALUE};
use crate::error::ConfigError;
use crate::fields::ResolvedFields;
use crate::hierarchy::{Axis, Hierarchy, NewNode, NodeKey};

/// Rejects totals policies that cannot be honored by the resolved fields.
pub fn validate_totals(config: &PivotLayoutConfig, resolved: &ResolvedFields) -> Result<(), ConfigError> {
    for (axis, total) in [(Axis::Row, &config.totals.row), (Axis::Col, &config.totals.col)] {
        let Some(total) = total else { continue };
        if !total.show_sub_totals {
            continue;
        }
        let dims: Vec<&String> = resolved
            .fields(axis)
            .iter()
            .filter(|f| *f != EXTRA_FIELD)
            .collect();
        // The innermost field is accepted; its nodes only get subtotals once
        // a drill-down gives them children.
        if let Some(dim) = total.sub_totals_dimensions.iter().find(|d| !dims.contains(d)) {
            return Err(ConfigError::ContradictoryTotals(format!(
                "subtotal dimension {} is not a {} field",
                dim, axis
            )));
        }
    }
    Ok(())
}

/// Adds total nodes to one axis tree.
pub struct TotalsInjector<'a> {
    axis: Axis,
    total: Option<&'a Total>,
    config: &'a PivotLayoutConfig,
    resolved: &'a ResolvedFields,
}

impl<'a> TotalsInjector<'a> {
    pub fn new(axis: Axis, config: &'a PivotLayoutConfig, resolved: &'a ResolvedFields) -> Self {
        let total = match axis {
            Axis::Row => config.totals.row.as_ref(),
            Axis::Col => config.totals.col.as_ref(),
        };
        TotalsInjector {
            axis,
            total,
            config,
            resolved,
        }
    }

    fn cache_rows(&self) -> bool {
        self.config.options.cache_row_subsets
    }

    fn measures_on_axis(&self) -> bool {
        self.resolved.measure_axis == Some(self.axis)
    }

    /// Subtotals are not shown for tree-mode rows.
    fn subtotals_enabled(&self) -> bool {
        !(self.axis == Axis::Row && self.resolved.hierarchy_type == HierarchyType::Tree)
    }

    /// Injects the grand total and all subtotals of a freshly built hierarchy.
    pub fn inject(&self, hierarchy: &mut Hierarchy, data: &DataSet) {
        let Some(total) = self.total else { return };
        self.inject_subtree(hierarchy, NodeKey::ROOT, data);

        let dimensions = hierarchy.fields().iter().filter(|f| *f != EXTRA_FIELD).count();
        // An axis made only of measures already shows one total per measure.
        if !total.show_grand_totals || (dimensions == 0 && self.measures_on_axis()) {
            return;
        }
        let field = hierarchy
            .fields()
            .first()
            .cloned()
            .unwrap_or_default();
        let position = if total.reverse_layout {
            0
        } else {
            hierarchy.root().children.len()
        };
        let label = total.grand_total_label().to_string();
        let rows = data.all_indices();
        let key = self.insert_total(hierarchy, NodeKey::ROOT, position, &field, label, TOTAL_VALUE, rows, data, true);
        log::debug!("{} grand total injected as {}", self.axis, hierarchy.node(key).id);
    }

    /// Injects subtotals for `key` and every node beneath it.
    pub fn inject_subtree(&self, hierarchy: &mut Hierarchy, key: NodeKey, data: &DataSet) {
        let Some(total) = self.total else { return };
        if !total.show_sub_totals || total.sub_totals_dimensions.is_empty() || !self.subtotals_enabled() {
            return;
        }

        // Collect first; inserting while walking would revisit new nodes.
        let mut targets = Vec::new();
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            let node = hierarchy.node(k);
            if node.is_totals() || node.is_measure() {
                continue;
            }
            let has_dimension_children = hierarchy
                .children(k)
                .any(|c| !c.is_measure() && !c.is_totals());
            if !node.is_root()
                && has_dimension_children
                && total.sub_totals_dimensions.contains(&node.field)
            {
                targets.push(k);
            }
            stack.extend(node.children.iter().copied());
        }

        let label = total.subtotal_label();
        for parent in targets {
            let (field, rows) = {
                let node = hierarchy.node(parent);
                let first = hierarchy.children(parent).find(|c| !c.is_totals());
                let field = first.map(|c| c.field.clone()).unwrap_or_default();
                // Cached rows index the node's own source; drilled children
                // live in another data set and need a scan of it.
                let rows = match (&node.rows, first) {
                    (Some(rows), Some(child)) if child.source == node.source => rows.clone(),
                    _ => data.matching(&[&node.query]),
                };
                (field, rows)
            };
            let position = if total.reverse_sub_layout {
                0
            } else {
                hierarchy.node(parent).children.len()
            };
            self.insert_total(hierarchy, parent, position, &field, label.to_string(), SUBTOTAL_VALUE, rows, data, false);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_total(
        &self,
        hierarchy: &mut Hierarchy,
        parent: NodeKey,
        position: usize,
        field: &str,
        label: String,
        segment: &str,
        rows: Vec<usize>,
        data: &DataSet,
        grand: bool,
    ) -> NodeKey {
        let Some(total) = self.total else { return parent };
        let aggregation = if grand { total.aggregation } else { total.aggregation_sub };
        // Rows index into the data set of the siblings, which differs from the
        // parent's own source beneath a drilled node.
        let query = hierarchy.node(parent).query.clone();
        let source = hierarchy
            .children(parent)
            .find(|c| !c.is_totals())
            .map_or(hierarchy.node(parent).source, |c| c.source);

        let mut node = NewNode::new(field, label, query.clone());
        node.segment = Some(segment.to_string());
        node.source = source;
        let key = hierarchy.insert_child(parent, position, node);

        let aggregates: SmallVec<[(String, Option<f64>); 4]> = self
            .resolved
            .measures
            .iter()
            .map(|m| (m.clone(), aggregate_rows(data, &rows, m, aggregation)))
            .collect();

        if self.measures_on_axis() {
            for measure in &self.resolved.measures {
                let mut child = NewNode::new(
                    EXTRA_FIELD,
                    measure.clone(),
                    query.with(EXTRA_FIELD, DataValue::from(measure.as_str())),
                );
                child.source = source;
                let child_key = hierarchy.add_child(key, child);
                let measure_aggregate = aggregates.iter().filter(|(m, _)| m == measure).cloned().collect();
                let label = self
                    .config
                    .meta_for(measure)
                    .and_then(|m| m.name.clone())
                    .unwrap_or_else(|| measure.clone());
                let c = hierarchy.node_mut(child_key);
                c.label = label;
                c.is_grand_total = grand;
                c.is_sub_total = !grand;
                c.aggregation = Some(aggregation);
                c.aggregates = measure_aggregate;
                if self.cache_rows() {
                    c.rows = Some(rows.clone());
                }
            }
        }

        let n = hierarchy.node_mut(key);
        n.is_grand_total = grand;
        n.is_sub_total = !grand;
        n.aggregation = Some(aggregation);
        n.aggregates = aggregates;
        if self.cache_rows() {
            n.rows = Some(rows);
        }
        key
    }
}

//! FILENAME: core/pivot-layout/src/builder.rs
//! Hierarchy Builder - recursive group-by over the axis fields.
//!
//! Algorithm per level:
//! 1. Group the rows in scope by the level's field (first-seen order)
//! 2. Order the groups with the Sorter
//! 3. Create one node per group and recurse with the group's rows
//!
//! The measure field does not partition rows: every measure node inherits the
//! rows of its parent. Collapsed nodes still get their children built.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::data::{DataSet, DataSourceId, DataValue};
use crate::definition::{HierarchyType, LayoutOptions, PivotLayoutConfig, SortParam, EXTRA_FIELD};
use crate::error::LayoutWarning;
use crate::fields::ResolvedFields;
use crate::hierarchy::{Axis, Hierarchy, NewNode, NodeKey};
use crate::sort::{Group, Sorter};

/// Initial collapse flag of a node.
///
/// An explicit entry in the axis' collapse map always wins; otherwise
/// `hierarchy_collapse` collapses every tree-mode row node that has children,
/// and strategy extras may collapse measure nodes.
pub(crate) fn collapse_flag(
    options: &LayoutOptions,
    resolved: &ResolvedFields,
    axis: Axis,
    node_id: &str,
    measure: Option<&str>,
    has_children: bool,
) -> bool {
    let state = match axis {
        Axis::Row => &options.collapsed_rows,
        Axis::Col => &options.collapsed_cols,
    };
    if let Some(&flag) = state.get(node_id) {
        return flag;
    }
    let tree_rows = axis == Axis::Row && options.hierarchy_type == HierarchyType::Tree;
    if tree_rows && options.hierarchy_collapse && has_children {
        return true;
    }
    measure
        .and_then(|m| resolved.extra_for(m))
        .map_or(false, |extra| extra.collapse)
}

/// Builds one axis tree, or one subtree of it.
pub struct HierarchyBuilder<'a> {
    axis: Axis,
    config: &'a PivotLayoutConfig,
    resolved: &'a ResolvedFields,
    data: &'a DataSet,
    source: DataSourceId,
    sorter: Sorter<'a>,
    /// Every value of a field across the data set, for `show_all_items`.
    all_values: FxHashMap<String, Vec<DataValue>>,
    warnings: Vec<LayoutWarning>,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(
        axis: Axis,
        config: &'a PivotLayoutConfig,
        resolved: &'a ResolvedFields,
        data: &'a DataSet,
    ) -> Self {
        HierarchyBuilder {
            axis,
            config,
            resolved,
            data,
            source: DataSourceId::BASE,
            sorter: Sorter::new(data, config.options.default_sort),
            all_values: FxHashMap::default(),
            warnings: Vec::new(),
        }
    }

    /// Tags every built node with `source` (drill-down data sets).
    pub fn with_source(mut self, source: DataSourceId) -> Self {
        self.source = source;
        self
    }

    /// Builds the full hierarchy of the builder's axis.
    pub fn build(&mut self) -> Hierarchy {
        let fields = self.resolved.fields(self.axis).to_vec();
        let mut hierarchy = Hierarchy::new(self.axis, fields.clone());
        hierarchy.set_index_every_node(
            self.axis == Axis::Row && self.resolved.hierarchy_type == HierarchyType::Tree,
        );

        let scope = self.data.all_indices();
        if self.config.options.cache_row_subsets {
            hierarchy.node_mut(NodeKey::ROOT).rows = Some(scope.clone());
        }
        if !fields.is_empty() {
            self.build_level(&mut hierarchy, NodeKey::ROOT, &fields, 0, &scope);
        }

        log::debug!(
            "built {} hierarchy: {} nodes over {} rows",
            self.axis,
            hierarchy.node_count(),
            scope.len()
        );
        hierarchy
    }

    /// Builds `fields` beneath `parent` from `scope` rows of the builder's data.
    pub fn build_subtree(
        &mut self,
        hierarchy: &mut Hierarchy,
        parent: NodeKey,
        fields: &[String],
        scope: &[usize],
    ) {
        if !fields.is_empty() {
            self.build_level(hierarchy, parent, fields, 0, scope);
        }
    }

    pub fn take_warnings(&mut self) -> Vec<LayoutWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Recursively builds one level of the tree.
    fn build_level(
        &mut self,
        hierarchy: &mut Hierarchy,
        parent: NodeKey,
        fields: &[String],
        level: usize,
        scope: &[usize],
    ) {
        let field = fields[level].as_str();
        let is_measure = field == EXTRA_FIELD;
        let parent_query = hierarchy.node(parent).query.clone();

        let groups = if is_measure {
            self.resolved
                .measures
                .iter()
                .map(|m| Group::new(DataValue::from(m.as_str()), scope.to_vec()))
                .collect()
        } else {
            self.group_rows(field, scope)
        };

        let params: Vec<&SortParam> = self.config.sort_params_for(field).collect();
        let groups = self.sorter.sort(field, groups, &params, &mut self.warnings);
        let has_children = level + 1 < fields.len();

        for group in groups {
            let value = group.value.label();
            let label = if is_measure {
                self.config
                    .meta_for(&value)
                    .and_then(|m| m.name.clone())
                    .unwrap_or_else(|| value.clone())
            } else {
                value.clone()
            };

            let mut node = NewNode::new(field, value.clone(), parent_query.with(field, group.value));
            node.label = label;
            node.source = self.source;
            let key = hierarchy.add_child(parent, node);

            let measure = is_measure.then_some(value.as_str());
            let collapsed = collapse_flag(
                &self.config.options,
                self.resolved,
                self.axis,
                &hierarchy.node(key).id,
                measure,
                has_children,
            );
            let remark = measure
                .and_then(|m| self.resolved.extra_for(m))
                .map(|e| e.remark.clone())
                .filter(|r| !r.is_empty());
            {
                let created = hierarchy.node_mut(key);
                created.is_collapsed = collapsed;
                created.remark = remark;
            }

            if has_children {
                self.build_level(hierarchy, key, fields, level + 1, &group.rows);
            }
            if self.config.options.cache_row_subsets {
                hierarchy.node_mut(key).rows = Some(group.rows);
            }
        }
    }

    /// Groups `scope` by `field` in first-seen order; empty groups are pruned
    /// unless `show_all_items` asks for placeholders.
    fn group_rows(&mut self, field: &str, scope: &[usize]) -> Vec<Group> {
        // Keyed by label; 2020 and "2020" share one node id.
        let rows = self.data.rows();
        let mut index: FxHashMap<String, usize> = FxHashMap::default();
        let mut groups: Vec<Group> = Vec::new();
        for &i in scope {
            let value = rows[i].get(field);
            let label = value.label();
            match index.get(&label) {
                Some(&g) => groups[g].rows.push(i),
                None => {
                    index.insert(label, groups.len());
                    groups.push(Group::new(value.clone(), vec![i]));
                }
            }
        }

        if self.config.options.show_all_items {
            let data = self.data;
            let all = self
                .all_values
                .entry(field.to_string())
                .or_insert_with(|| distinct_values(data, field));
            for value in all.iter() {
                if !index.contains_key(&value.label()) {
                    groups.push(Group::new(value.clone(), Vec::new()));
                }
            }
        }
        groups
    }
}

fn distinct_values(data: &DataSet, field: &str) -> Vec<DataValue> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut out = Vec::new();
    for row in data.rows() {
        let value = row.get(field);
        if seen.insert(value.label()) {
            out.push(value.clone());
        }
    }
    out
}

//! FILENAME: core/pivot-layout/src/drill.rs
//! Drill-down - splices an extra row dimension beneath one row leaf.
//!
//! A drill runs in two phases so the caller can fetch the detail rows in
//! between: `begin` reserves the target node, `complete` builds the subtree.
//! Pending drills on the same node, an ancestor or a descendant are rejected.
//! Everything is validated before the tree is touched.

use rustc_hash::FxHashMap;

use crate::builder::HierarchyBuilder;
use crate::data::{DataRow, DataSet};
use crate::definition::EXTRA_FIELD;
use crate::error::{ConfigError, LayoutWarning, PivotError, Result};
use crate::hierarchy::{Axis, Hierarchy, NodeKey};
use crate::layout::LayoutResult;
use crate::totals::TotalsInjector;

/// Reservation returned by `DrillDownManager::begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrillToken(u64);

impl DrillToken {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// What a completed (or cleared) drill changed in the row leaf sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct DrillOutcome {
    pub node_id: String,
    /// Leaf index where the replaced run started.
    pub start: usize,
    /// Leaves that were replaced.
    pub removed: usize,
    /// Leaves now in their place.
    pub inserted: usize,
    pub warnings: Vec<LayoutWarning>,
}

/// Tracks pending drills against one `LayoutResult`.
#[derive(Debug, Default)]
pub struct DrillDownManager {
    next_token: u64,
    /// Token → target node id.
    pending: FxHashMap<u64, String>,
}

impl DrillDownManager {
    pub fn new() -> Self {
        DrillDownManager::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Reserves `node_id` for a drill.
    pub fn begin(&mut self, layout: &LayoutResult, node_id: &str) -> Result<DrillToken> {
        let rows = &layout.rows;
        let key = rows
            .key_of(node_id)
            .ok_or_else(|| PivotError::UnknownNode(node_id.to_string()))?;
        check_target(rows, key)?;
        self.check_conflicts(rows, key, node_id)?;

        let token = DrillToken(self.next_token);
        self.next_token += 1;
        self.pending.insert(token.0, node_id.to_string());
        log::debug!("drill-down {} reserved {}", token.0, node_id);
        Ok(token)
    }

    /// Releases a reservation; false if the token was not pending.
    pub fn cancel(&mut self, token: DrillToken) -> bool {
        self.pending.remove(&token.0).is_some()
    }

    /// Builds `drill_field` beneath the reserved node from `data`.
    ///
    /// The token is consumed whether or not the drill succeeds.
    pub fn complete(
        &mut self,
        layout: &mut LayoutResult,
        token: DrillToken,
        drill_field: &str,
        data: Vec<DataRow>,
    ) -> Result<DrillOutcome> {
        let node_id = self
            .pending
            .remove(&token.0)
            .ok_or(PivotError::UnknownDrillToken(token.0))?;
        apply_drill(layout, &node_id, drill_field, data)
    }

    /// `begin` followed by `complete`.
    pub fn drill_down(
        &mut self,
        layout: &mut LayoutResult,
        node_id: &str,
        drill_field: &str,
        data: Vec<DataRow>,
    ) -> Result<DrillOutcome> {
        let token = self.begin(layout, node_id)?;
        self.complete(layout, token, drill_field, data)
    }

    /// Removes the drilled children of `node_id`; the node is a leaf again.
    pub fn clear(&mut self, layout: &mut LayoutResult, node_id: &str) -> Result<DrillOutcome> {
        let key = layout
            .rows
            .key_of(node_id)
            .ok_or_else(|| PivotError::UnknownNode(node_id.to_string()))?;
        if layout.rows.node(key).drill_source.is_none() {
            return Err(PivotError::InvalidDrillTarget {
                node: node_id.to_string(),
                reason: "not drilled".to_string(),
            });
        }
        self.check_conflicts(&layout.rows, key, node_id)?;

        let old = layout.rows.visible_sequence(key);
        layout.rows.remove_descendants(key);
        if let Some(source) = layout.rows.node_mut(key).drill_source.take() {
            layout.release_source(source);
        }
        let (start, inserted) = layout.rows.splice_leaves(key, &old);
        layout.rows.compact();
        layout.relayout_axis(Axis::Row);

        log::debug!("drill-down cleared on {}", node_id);
        Ok(DrillOutcome {
            node_id: node_id.to_string(),
            start,
            removed: old.len(),
            inserted,
            warnings: Vec::new(),
        })
    }

    fn check_conflicts(&self, rows: &Hierarchy, key: NodeKey, node_id: &str) -> Result<()> {
        for pending_id in self.pending.values() {
            let Some(pending) = rows.key_of(pending_id) else { continue };
            if pending == key || rows.is_ancestor(pending, key) || rows.is_ancestor(key, pending) {
                return Err(PivotError::DrillConflict {
                    requested: node_id.to_string(),
                    pending: pending_id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A drill target is a visible dimension leaf, or a node drilled before.
fn check_target(rows: &Hierarchy, key: NodeKey) -> Result<()> {
    let node = rows.node(key);
    let reason = if node.is_root() {
        Some("the root cannot be drilled")
    } else if node.is_totals() {
        Some("totals cannot be drilled")
    } else if node.is_measure() {
        Some("measure nodes cannot be drilled")
    } else if !rows.is_visible(key) {
        Some("node is hidden by a collapsed ancestor")
    } else if !node.is_leaf() && node.drill_source.is_none() {
        Some("node has children")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(PivotError::InvalidDrillTarget {
            node: node.id.clone(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn apply_drill(
    layout: &mut LayoutResult,
    node_id: &str,
    drill_field: &str,
    data: Vec<DataRow>,
) -> Result<DrillOutcome> {
    let key = layout
        .rows
        .key_of(node_id)
        .ok_or_else(|| PivotError::UnknownNode(node_id.to_string()))?;
    check_target(&layout.rows, key)?;

    if drill_field == EXTRA_FIELD {
        return Err(ConfigError::ReservedField(drill_field.to_string()).into());
    }
    let on_path = layout
        .rows
        .ancestors(key)
        .chain(std::iter::once(layout.rows.node(key)))
        .any(|n| n.field == drill_field);
    if on_path || layout.resolved.col_fields.iter().any(|f| f == drill_field) {
        return Err(ConfigError::DuplicateField(drill_field.to_string()).into());
    }

    // Keep rows that belong to the node; fill in the node's own values so
    // later cell queries match them.
    let query = layout.rows.node(key).query.clone();
    let total = data.len();
    let mut kept: Vec<DataRow> = data.into_iter().filter(|r| query.admits(r)).collect();
    for row in &mut kept {
        for (field, value) in query.iter() {
            if field != EXTRA_FIELD && !row.contains(field) {
                row.set(field, value.clone());
            }
        }
    }
    if !kept.is_empty() && !kept.iter().any(|r| r.contains(drill_field)) {
        return Err(ConfigError::UnknownField {
            field: drill_field.to_string(),
            area: "drill-down",
        }
        .into());
    }

    let mut warnings = Vec::new();
    let dropped = total - kept.len();
    if dropped > 0 {
        let warning = LayoutWarning::DroppedDrillRows {
            node: node_id.to_string(),
            count: dropped,
        };
        log::warn!("{}", warning);
        warnings.push(warning);
    }

    // Validation done; from here on the tree changes.
    let drill_data = DataSet::new(kept);
    let source = match layout.rows.node(key).drill_source {
        Some(existing) => {
            layout.sources[existing.0 as usize] = drill_data;
            existing
        }
        None => layout.store_source(drill_data),
    };

    let old = layout.rows.visible_sequence(key);
    layout.rows.remove_descendants(key);
    layout.rows.node_mut(key).drill_source = Some(source);

    {
        let LayoutResult {
            config,
            resolved,
            rows,
            sources,
            ..
        } = &mut *layout;
        let drill_data = &sources[source.0 as usize];
        let mut builder = HierarchyBuilder::new(Axis::Row, config, resolved, drill_data)
            .with_source(source);
        builder.build_subtree(rows, key, &[drill_field.to_string()], &drill_data.all_indices());
        warnings.extend(builder.take_warnings());
        TotalsInjector::new(Axis::Row, config, resolved).inject_subtree(rows, key, drill_data);
    }

    // Only the drilled run of leaves changes; the rest keeps its projection.
    let (start, inserted) = layout.rows.splice_leaves(key, &old);
    layout.rows.compact();
    layout.relayout_axis(Axis::Row);
    layout.warnings.extend(warnings.iter().cloned());

    log::debug!(
        "drill-down on {} by {}: {} leaves replaced by {}",
        node_id,
        drill_field,
        old.len(),
        inserted
    );
    Ok(DrillOutcome {
        node_id: node_id.to_string(),
        start,
        removed: old.len(),
        inserted,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataSourceId;
    use crate::definition::{PivotLayoutConfig, Total};
    use crate::engine::build_layout;

    fn layout() -> LayoutResult {
        let data = DataSet::new(vec![
            DataRow::new().with("region", "east").with("year", "2020").with("sales", 10),
            DataRow::new().with("region", "west").with("year", "2020").with("sales", 20),
        ]);
        build_layout(PivotLayoutConfig::new(&["region"], &["year"], &["sales"]), data).unwrap()
    }

    fn city_rows() -> Vec<DataRow> {
        vec![
            DataRow::new().with("region", "east").with("city", "A").with("year", "2020").with("sales", 6),
            DataRow::new().with("region", "east").with("city", "B").with("year", "2020").with("sales", 4),
        ]
    }

    #[test]
    fn test_drill_replaces_leaf_with_children() {
        let mut layout = layout();
        let mut drills = DrillDownManager::new();
        let outcome = drills
            .drill_down(&mut layout, "root[&]east", "city", city_rows())
            .unwrap();

        assert_eq!((outcome.start, outcome.removed, outcome.inserted), (0, 1, 2));
        let ids: Vec<&str> = layout.row_leaf_nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["root[&]east[&]A", "root[&]east[&]B", "root[&]west"]);
        assert_eq!(layout.row_hierarchy().get("root[&]west").unwrap().index, Some(2));

        let meta = layout.get_view_meta(1, 0).unwrap().unwrap();
        assert_eq!(meta.number(), Some(4.0));
        assert_ne!(meta.source, DataSourceId::BASE);
    }

    #[test]
    fn test_rows_missing_node_values_are_completed() {
        let mut layout = layout();
        let rows = vec![DataRow::new().with("city", "A").with("year", "2020").with("sales", 6)];
        DrillDownManager::new()
            .drill_down(&mut layout, "root[&]east", "city", rows)
            .unwrap();

        let meta = layout.get_view_meta(0, 0).unwrap().unwrap();
        assert_eq!(meta.number(), Some(6.0));
    }

    #[test]
    fn test_contradicting_rows_are_dropped_with_warning() {
        let mut layout = layout();
        let mut rows = city_rows();
        rows.push(DataRow::new().with("region", "west").with("city", "C").with("sales", 1));
        let outcome = DrillDownManager::new()
            .drill_down(&mut layout, "root[&]east", "city", rows)
            .unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(
            outcome.warnings,
            vec![LayoutWarning::DroppedDrillRows {
                node: "root[&]east".into(),
                count: 1
            }]
        );
        assert_eq!(layout.warnings().len(), 1);
    }

    #[test]
    fn test_overlapping_pending_drills_conflict() {
        let layout = layout();
        let mut drills = DrillDownManager::new();
        let token = drills.begin(&layout, "root[&]east").unwrap();

        assert!(matches!(
            drills.begin(&layout, "root[&]east"),
            Err(PivotError::DrillConflict { .. })
        ));
        // A sibling is independent.
        assert!(drills.begin(&layout, "root[&]west").is_ok());

        assert!(drills.cancel(token));
        assert!(!drills.cancel(token));
        assert!(drills.begin(&layout, "root[&]east").is_ok());
    }

    #[test]
    fn test_invalid_drill_leaves_tree_unchanged() {
        let mut layout = layout();
        let mut drills = DrillDownManager::new();

        assert!(matches!(
            drills.drill_down(&mut layout, "root[&]east", "region", city_rows()),
            Err(PivotError::Configuration(ConfigError::DuplicateField(_)))
        ));
        assert!(matches!(
            drills.drill_down(&mut layout, "root[&]east", "district", city_rows()),
            Err(PivotError::Configuration(ConfigError::UnknownField { .. }))
        ));
        assert!(matches!(
            drills.drill_down(&mut layout, "root[&]north", "city", city_rows()),
            Err(PivotError::UnknownNode(_))
        ));
        assert_eq!(layout.row_count(), 2);
        assert_eq!(drills.pending_count(), 0);
    }

    #[test]
    fn test_redrill_replaces_children_and_clear_restores() {
        let mut layout = layout();
        let mut drills = DrillDownManager::new();
        drills
            .drill_down(&mut layout, "root[&]east", "city", city_rows())
            .unwrap();

        let one_city = vec![DataRow::new().with("region", "east").with("city", "Z").with("sales", 1)];
        let outcome = drills
            .drill_down(&mut layout, "root[&]east", "city", one_city)
            .unwrap();
        assert_eq!((outcome.removed, outcome.inserted), (2, 1));
        assert!(layout.row_hierarchy().get("root[&]east[&]A").is_none());
        assert_eq!(layout.row_count(), 2);

        let outcome = drills.clear(&mut layout, "root[&]east").unwrap();
        assert_eq!((outcome.removed, outcome.inserted), (1, 1));
        assert_eq!(layout.row_leaf_nodes()[0].id, "root[&]east");
        assert!(drills.clear(&mut layout, "root[&]east").is_err());
    }

    #[test]
    fn test_complete_with_unknown_token() {
        let mut layout = layout();
        let mut drills = DrillDownManager::new();
        let token = drills.begin(&layout, "root[&]east").unwrap();
        drills.complete(&mut layout, token, "city", city_rows()).unwrap();

        assert_eq!(
            drills.complete(&mut layout, token, "city", city_rows()),
            Err(PivotError::UnknownDrillToken(token.id()))
        );
    }

    #[test]
    fn test_drill_adds_subtotal_from_drill_rows() {
        let data = DataSet::new(vec![
            DataRow::new().with("region", "east").with("year", "2020").with("sales", 10),
            DataRow::new().with("region", "west").with("year", "2020").with("sales", 20),
        ]);
        let mut config = PivotLayoutConfig::new(&["region"], &["year"], &["sales"]);
        config.totals.row = Some(Total {
            show_sub_totals: true,
            sub_totals_dimensions: vec!["region".into()],
            ..Total::default()
        });
        let mut layout = build_layout(config, data).unwrap();
        assert_eq!(layout.row_count(), 2);

        let detail = vec![
            DataRow::new().with("region", "east").with("city", "B").with("year", "2020").with("sales", 4),
            DataRow::new().with("region", "east").with("city", "A").with("year", "2020").with("sales", 3),
        ];
        let outcome = DrillDownManager::new()
            .drill_down(&mut layout, "root[&]east", "city", detail)
            .unwrap();
        assert_eq!(outcome.inserted, 3);

        let ids: Vec<&str> = layout.row_leaf_nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["root[&]east[&]B", "root[&]east[&]A", "root[&]east[&]$$subtotal$$", "root[&]west"]
        );
        let sub = layout.row_hierarchy().get("root[&]east[&]$$subtotal$$").unwrap();
        assert_eq!(sub.aggregate("sales"), Some(7.0));
        assert_eq!(sub.rows.as_deref(), Some(&[0, 1][..]));
        let meta = layout.get_view_meta(2, 0).unwrap().unwrap();
        assert!(meta.is_totals);
        assert_eq!(meta.number(), Some(7.0));
    }

    #[test]
    fn test_splice_matches_full_projection() {
        let mut layout = layout();
        DrillDownManager::new()
            .drill_down(&mut layout, "root[&]east", "city", city_rows())
            .unwrap();

        let mut projected = layout.row_hierarchy().clone();
        projected.project();
        assert_eq!(projected.leaf_nodes(), layout.row_hierarchy().leaf_nodes());
        assert_eq!(projected.nodes_at_level(2), layout.row_hierarchy().nodes_at_level(2));

        let rows = layout.row_leaf_nodes();
        let y: Vec<f64> = rows.iter().map(|n| n.y).collect();
        assert_eq!(y, vec![0.0, 30.0, 60.0]);
        let east = layout.row_hierarchy().get("root[&]east").unwrap();
        assert_eq!((east.y, east.height), (0.0, 60.0));
    }

    #[test]
    fn test_repeated_drill_and_clear_reuse_storage() {
        let mut layout = layout();
        let mut drills = DrillDownManager::new();
        for _ in 0..5 {
            drills
                .drill_down(&mut layout, "root[&]east", "city", city_rows())
                .unwrap();
            drills.clear(&mut layout, "root[&]east").unwrap();
        }

        assert_eq!(layout.sources.len(), 2);
        assert!(layout.sources[1].is_empty());
        let rows = layout.row_hierarchy();
        assert_eq!(rows.node_count(), 2);
        assert!(rows.arena_len() <= 2 * (rows.node_count() + 1));
        assert_eq!(layout.row_leaf_nodes()[1].id, "root[&]west");
        assert_eq!(layout.get_view_meta(1, 0).unwrap().unwrap().number(), Some(20.0));
    }
}

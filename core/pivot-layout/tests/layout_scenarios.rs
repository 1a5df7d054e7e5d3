//! FILENAME: core/pivot-layout/tests/layout_scenarios.rs
//! End-to-end layout scenarios built from JSON fixtures.

use pivot_layout::{
    build_layout, Axis, CollapseState, DataRow, DataSet, DrillDownManager, LayoutResult,
    PivotError, PivotLayoutConfig,
};
use serde_json::{json, Value};

fn data(rows: Value) -> DataSet {
    serde_json::from_value(rows).unwrap()
}

fn config(value: Value) -> PivotLayoutConfig {
    serde_json::from_value(value).unwrap()
}

fn sales_data() -> DataSet {
    data(json!([
        { "region": "east", "year": 2020, "sales": 10, "profit": 3 },
        { "region": "east", "year": 2021, "sales": 20, "profit": 4 },
    ]))
}

fn region_data() -> DataSet {
    data(json!([
        { "region": "east", "province": "zj", "city": "hz", "year": 2020, "sales": 10, "profit": 3 },
        { "region": "east", "province": "zj", "city": "nb", "year": 2021, "sales": 7, "profit": 1 },
        { "region": "east", "province": "js", "city": "nj", "year": 2020, "sales": 5, "profit": 2 },
        { "region": "west", "province": "sc", "city": "cd", "year": 2020, "sales": 12, "profit": 4 },
        { "region": "west", "province": "sc", "city": "my", "year": 2021, "sales": 3, "profit": 0 },
        { "region": "west", "province": "yn", "city": "km", "year": 2021, "sales": 8, "profit": 2 },
    ]))
}

fn leaf_ids(layout: &LayoutResult, axis: Axis) -> Vec<String> {
    let nodes = match axis {
        Axis::Row => layout.row_leaf_nodes(),
        Axis::Col => layout.col_leaf_nodes(),
    };
    nodes.iter().map(|n| n.id.clone()).collect()
}

/// Every cell of the layout as (value, backing row count).
fn all_cells(layout: &LayoutResult) -> Vec<(Option<f64>, usize)> {
    let mut cells = Vec::new();
    for r in 0..layout.row_count() {
        for c in 0..layout.col_count() {
            let meta = layout.get_view_meta(r, c).unwrap().unwrap();
            cells.push((meta.number(), meta.data.len()));
        }
    }
    cells
}

#[test]
fn test_region_by_year_with_two_measures() {
    let layout = build_layout(
        config(json!({
            "fields": { "rows": ["region"], "columns": ["year"], "values": ["sales", "profit"] }
        })),
        sales_data(),
    )
    .unwrap();

    assert_eq!(leaf_ids(&layout, Axis::Row), vec!["root[&]east"]);
    assert_eq!(
        leaf_ids(&layout, Axis::Col),
        vec![
            "root[&]2020[&]sales",
            "root[&]2020[&]profit",
            "root[&]2021[&]sales",
            "root[&]2021[&]profit"
        ]
    );

    let meta = layout.get_view_meta(0, 0).unwrap().unwrap();
    assert_eq!(meta.data.len(), 1);
    assert_eq!(meta.value_field, "sales");
    assert_eq!(meta.number(), Some(10.0));
    assert_eq!(meta.row_indices, vec![0]);

    let meta = layout.get_view_meta(0, 3).unwrap().unwrap();
    assert_eq!(meta.value_field, "profit");
    assert_eq!(meta.number(), Some(4.0));
}

#[test]
fn test_trailing_grand_total_row() {
    let layout = build_layout(
        config(json!({
            "fields": { "rows": ["region"], "columns": [], "values": ["sales", "profit"] },
            "totals": { "row": { "show_grand_totals": true, "aggregation": "SUM" } }
        })),
        sales_data(),
    )
    .unwrap();

    assert_eq!(layout.row_count(), 2);
    let total = layout.row_leaf_nodes()[1];
    assert!(total.is_grand_total);
    assert_eq!(total.label, "grand total");

    let sales = layout.get_view_meta(1, 0).unwrap().unwrap();
    let profit = layout.get_view_meta(1, 1).unwrap().unwrap();
    assert!(sales.is_totals);
    assert_eq!(sales.number(), Some(30.0));
    assert_eq!(profit.number(), Some(7.0));
}

#[test]
fn test_drill_down_adds_city_leaves() {
    let mut layout = build_layout(
        config(json!({
            "fields": { "rows": ["region"], "columns": ["year"], "values": ["sales"] }
        })),
        sales_data(),
    )
    .unwrap();
    let before = layout.row_count();

    let rows: Vec<DataRow> = serde_json::from_value(json!([
        { "region": "east", "city": "A", "year": 2020, "sales": 6 },
        { "region": "east", "city": "B", "year": 2020, "sales": 4 },
        { "region": "east", "city": "B", "year": 2021, "sales": 20 },
    ]))
    .unwrap();
    let mut drills = DrillDownManager::new();
    let outcome = drills.drill_down(&mut layout, "root[&]east", "city", rows).unwrap();

    assert_eq!(layout.row_count(), before + 1);
    assert_eq!(outcome.inserted, 2);
    assert_eq!(
        leaf_ids(&layout, Axis::Row),
        vec!["root[&]east[&]A", "root[&]east[&]B"]
    );
    let city_b_2021 = layout.get_view_meta(1, 1).unwrap().unwrap();
    assert_eq!(city_b_2021.number(), Some(20.0));
    let city_a_2021 = layout.get_view_meta(0, 1).unwrap().unwrap();
    assert!(city_a_2021.is_empty());
}

#[test]
fn test_two_phase_drill_rejects_overlap() {
    let mut layout = build_layout(
        config(json!({
            "fields": { "rows": ["region", "province"], "columns": [], "values": ["sales"] },
            "options": { "collapsed_rows": { "root[&]west": true } }
        })),
        region_data(),
    )
    .unwrap();
    let mut drills = DrillDownManager::new();

    let zj = drills.begin(&layout, "root[&]east[&]zj").unwrap();
    assert!(matches!(
        drills.begin(&layout, "root[&]east[&]zj"),
        Err(PivotError::DrillConflict { .. })
    ));
    // Non-leaf rows cannot be drilled at all.
    assert!(matches!(
        drills.begin(&layout, "root[&]east"),
        Err(PivotError::InvalidDrillTarget { .. })
    ));
    // A collapsed row still owns its built children.
    assert!(drills.begin(&layout, "root[&]west").is_err());
    // Siblings of a pending drill are independent.
    assert!(drills.begin(&layout, "root[&]east[&]js").is_ok());

    let rows: Vec<DataRow> = serde_json::from_value(json!([
        { "city": "hz", "sales": 10 },
        { "city": "nb", "sales": 7 },
    ]))
    .unwrap();
    drills.complete(&mut layout, zj, "city", rows).unwrap();
    assert_eq!(
        leaf_ids(&layout, Axis::Row),
        vec![
            "root[&]east[&]zj[&]hz",
            "root[&]east[&]zj[&]nb",
            "root[&]east[&]js",
            "root[&]west"
        ]
    );
    assert_eq!(drills.pending_count(), 1);
}

#[test]
fn test_rows_only_gives_single_measure_column() {
    for rows in [
        json!([{ "region": "east", "sales": 1 }]),
        json!([
            { "region": "east", "sales": 1 },
            { "region": "west", "sales": 2 },
            { "region": "north", "sales": 3 }
        ]),
    ] {
        let layout = build_layout(
            config(json!({
                "fields": { "rows": ["region"], "columns": [], "values": ["sales"] }
            })),
            data(rows),
        )
        .unwrap();

        assert_eq!(leaf_ids(&layout, Axis::Col), vec!["root[&]sales"]);
    }
}

#[test]
fn test_leaf_rows_cover_input_exactly_once() {
    let input = region_data();
    let layout = build_layout(
        config(json!({
            "fields": { "rows": ["region", "province", "city"], "columns": [], "values": ["sales"] },
            "totals": { "row": { "show_grand_totals": true } }
        })),
        input.clone(),
    )
    .unwrap();

    let mut covered: Vec<usize> = layout
        .row_leaf_nodes()
        .iter()
        .filter(|n| !n.is_totals())
        .flat_map(|n| n.rows.clone().unwrap_or_default())
        .collect();
    covered.sort_unstable();
    assert_eq!(covered, input.all_indices());
}

#[test]
fn test_subtotals_are_additive_and_leave_details_alone() {
    let base = json!({
        "fields": { "rows": ["region", "province"], "columns": ["year"], "values": ["sales"] }
    });
    let mut with_totals = base.clone();
    with_totals["totals"] = json!({
        "row": { "show_sub_totals": true, "sub_totals_dimensions": ["region"] }
    });

    let plain = build_layout(config(base), region_data()).unwrap();
    let totals = build_layout(config(with_totals), region_data()).unwrap();

    // Subtotal of east in 2020 equals the sum of its provinces.
    let east_sub = totals
        .row_leaf_nodes()
        .iter()
        .position(|n| n.id == "root[&]east[&]$$subtotal$$")
        .unwrap();
    let sub_2020 = totals.get_view_meta(east_sub, 0).unwrap().unwrap();
    assert!(sub_2020.is_totals);
    assert_eq!(sub_2020.number(), Some(15.0));

    // Every detail row keeps its values.
    for (r, node) in plain.row_leaf_nodes().iter().enumerate() {
        let index = totals.row_hierarchy().get(&node.id).unwrap().index.unwrap();
        for c in 0..plain.col_count() {
            let a = plain.get_view_meta(r, c).unwrap().unwrap();
            let b = totals.get_view_meta(index, c).unwrap().unwrap();
            assert_eq!(a.number(), b.number());
            assert_eq!(a.row_indices, b.row_indices);
        }
    }
}

#[test]
fn test_collapse_then_expand_restores_layout() {
    let mut layout = build_layout(
        config(json!({
            "fields": { "rows": ["region", "province"], "columns": ["year"], "values": ["sales"] }
        })),
        region_data(),
    )
    .unwrap();
    let ids = leaf_ids(&layout, Axis::Row);
    let geometry: Vec<(f64, f64)> = layout.row_leaf_nodes().iter().map(|n| (n.y, n.height)).collect();

    let mut collapsed = CollapseState::default();
    collapsed.insert("root[&]east".to_string(), true);
    layout.apply_collapse_state(collapsed, CollapseState::default());
    assert_eq!(layout.row_count(), ids.len() - 1);
    assert_eq!(layout.get_view_meta(0, 0).unwrap().unwrap().number(), Some(15.0));

    layout.apply_collapse_state(CollapseState::default(), CollapseState::default());
    assert_eq!(leaf_ids(&layout, Axis::Row), ids);
    let restored: Vec<(f64, f64)> = layout.row_leaf_nodes().iter().map(|n| (n.y, n.height)).collect();
    assert_eq!(restored, geometry);
}

#[test]
fn test_tree_mode_rows() {
    let layout = build_layout(
        config(json!({
            "fields": { "rows": ["region", "province"], "columns": [], "values": ["sales"] },
            "totals": { "row": { "show_sub_totals": true, "sub_totals_dimensions": ["region"] } },
            "options": { "hierarchy_type": "tree" }
        })),
        region_data(),
    )
    .unwrap();

    assert_eq!(
        leaf_ids(&layout, Axis::Row),
        vec![
            "root[&]east",
            "root[&]east[&]zj",
            "root[&]east[&]js",
            "root[&]west",
            "root[&]west[&]sc",
            "root[&]west[&]yn"
        ]
    );
    // The parent row carries the aggregate that a subtotal would repeat.
    assert_eq!(layout.get_view_meta(0, 0).unwrap().unwrap().number(), Some(22.0));
    assert!(layout.row_leaf_nodes().iter().all(|n| n.x == 0.0));
}

#[test]
fn test_out_of_range_is_an_error() {
    let layout = build_layout(
        config(json!({
            "fields": { "rows": ["region"], "columns": ["year"], "values": ["sales"] }
        })),
        sales_data(),
    )
    .unwrap();

    assert_eq!(
        layout.get_view_meta(0, 2).unwrap_err(),
        PivotError::IndexOutOfRange {
            axis: Axis::Col,
            index: 2,
            len: 2
        }
    );
}

#[test]
fn test_cached_and_scanned_lookups_agree() {
    let base = json!({
        "fields": { "rows": ["region", "province"], "columns": ["year"], "values": ["sales", "profit"] },
        "totals": {
            "row": { "show_grand_totals": true, "show_sub_totals": true, "sub_totals_dimensions": ["region"] },
            "col": { "show_grand_totals": true, "aggregation": "MAX" }
        }
    });
    let mut uncached = base.clone();
    uncached["options"] = json!({ "cache_row_subsets": false });

    let cached = build_layout(config(base), region_data()).unwrap();
    let scanned = build_layout(config(uncached), region_data()).unwrap();

    assert_eq!(leaf_ids(&cached, Axis::Row), leaf_ids(&scanned, Axis::Row));
    assert_eq!(leaf_ids(&cached, Axis::Col), leaf_ids(&scanned, Axis::Col));
    assert_eq!(all_cells(&cached), all_cells(&scanned));
}

#[test]
fn test_sort_rules_from_json() {
    let layout = build_layout(
        config(json!({
            "fields": { "rows": ["region", "province"], "columns": [], "values": ["sales"] },
            "sort_params": [
                { "sort_field_id": "region", "sort_by": ["west", "east"] },
                { "sort_field_id": "province", "sort_by_field": "sales", "sort_method": "DESC" }
            ]
        })),
        region_data(),
    )
    .unwrap();

    assert_eq!(
        leaf_ids(&layout, Axis::Row),
        vec![
            "root[&]west[&]sc",
            "root[&]west[&]yn",
            "root[&]east[&]zj",
            "root[&]east[&]js"
        ]
    );
    assert!(layout.warnings().is_empty());
}

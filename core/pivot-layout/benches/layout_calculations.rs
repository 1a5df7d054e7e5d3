//! FILENAME: core/pivot-layout/benches/layout_calculations.rs
//! Layout build and cell lookup benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pivot_layout::{
    build_layout, DataRow, DataSet, DrillDownManager, PivotLayoutConfig, Total, Totals,
};

const SIZES: [usize; 3] = [1_000, 10_000, 100_000];

fn generate_rows(count: usize) -> DataSet {
    let regions = ["north", "south", "east", "west"];
    let rows = (0..count)
        .map(|i| {
            DataRow::new()
                .with("region", regions[i % regions.len()])
                .with("province", format!("p{}", i % 37))
                .with("year", 2015 + (i % 8) as i64)
                .with("quarter", format!("Q{}", i % 4 + 1))
                .with("sales", (i % 500) as f64 * 1.5)
                .with("profit", (i % 90) as f64 - 20.0)
        })
        .collect();
    DataSet::new(rows)
}

fn config(cache_row_subsets: bool) -> PivotLayoutConfig {
    let mut config = PivotLayoutConfig::new(&["region", "province"], &["year", "quarter"], &["sales", "profit"]);
    config.totals = Totals {
        row: Some(Total {
            show_grand_totals: true,
            show_sub_totals: true,
            sub_totals_dimensions: vec!["region".to_string()],
            ..Total::default()
        }),
        col: Some(Total {
            show_grand_totals: true,
            ..Total::default()
        }),
    };
    config.options.cache_row_subsets = cache_row_subsets;
    config
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_layout");
    for size in SIZES {
        let data = generate_rows(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| black_box(build_layout(config(true), data.clone())))
        });
    }
    group.finish();
}

fn bench_view_meta(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_view_meta");
    let data = generate_rows(10_000);
    for (name, cached) in [("cached", true), ("scanned", false)] {
        let Ok(layout) = build_layout(config(cached), data.clone()) else {
            continue;
        };
        let cells = layout.row_count() * layout.col_count();
        group.throughput(Throughput::Elements(cells as u64));
        group.bench_function(name, |b| {
            b.iter(|| {
                for r in 0..layout.row_count() {
                    for c in 0..layout.col_count() {
                        black_box(layout.get_view_meta(r, c).ok());
                    }
                }
            })
        });
    }
    group.finish();
}

fn bench_drill(c: &mut Criterion) {
    let data = generate_rows(10_000);
    let Ok(base) = build_layout(config(true), data) else {
        return;
    };
    let detail: Vec<DataRow> = (0..200)
        .map(|i| {
            DataRow::new()
                .with("city", format!("c{}", i))
                .with("year", 2015 + (i % 8) as i64)
                .with("sales", i as f64)
        })
        .collect();

    c.bench_function("drill_down", |b| {
        b.iter_batched(
            || (base_clone(&base), detail.clone()),
            |(mut layout, rows)| {
                let mut drills = DrillDownManager::new();
                black_box(drills.drill_down(&mut layout, "root[&]north[&]p0", "city", rows).ok());
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn base_clone(layout: &pivot_layout::LayoutResult) -> pivot_layout::LayoutResult {
    build_layout(layout.config().clone(), layout.data().clone())
        .unwrap_or_else(|e| panic!("rebuild failed: {}", e))
}

criterion_group!(benches, bench_build, bench_view_meta, bench_drill);
criterion_main!(benches);

// Benchmarks the Sequential / SIMD / Parallel filter strategies across the
// row-count thresholds the physical planner chooses between (`datafusion`'s
// `benches/filter_query_sql.rs` is the model for wiring a criterion group
// straight through a query engine rather than benchmarking kernels in
// isolation).

use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::{ArrayRef, Int32Array};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use columnar_engine::cancellation::CancellationToken;
use columnar_engine::config::EngineConfig;
use columnar_engine::engine::QueryEngine;
use columnar_engine::predicate::CompareOp;
use columnar_engine::schema::{ColumnDef, Encoding, LogicalType, Schema, Snapshot};
use columnar_engine::translator::{Constant, SurfaceExpr, SurfaceOp, SurfaceQuery, TerminalOp};

fn age_snapshot(n: usize) -> Snapshot {
    let schema = Arc::new(Schema::new(vec![ColumnDef {
        name: "age".into(),
        logical_type: LogicalType::I32,
        nullable: false,
        encoding: Encoding::Plain,
    }]));
    let values: Vec<i32> = (0..n as i32).map(|i| i % 100).collect();
    let arr: ArrayRef = Arc::new(Int32Array::from(values));
    Snapshot::try_new(schema, vec![arr], HashMap::new()).unwrap()
}

fn filter_query() -> SurfaceQuery {
    SurfaceQuery {
        table_name: "t".into(),
        ops: vec![SurfaceOp::Filter(SurfaceExpr::Compare {
            column: "age".into(),
            op: CompareOp::Gt,
            value: Constant::I64(50),
        })],
        terminal: TerminalOp::Count,
    }
}

fn bench_filter_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_count");
    // Spans Sequential (<1_000), SIMD, and Parallel (>=50_000) per the
    // physical planner's thresholds.
    for &n in &[500usize, 10_000, 100_000, 1_000_000] {
        let snapshot = age_snapshot(n);
        let engine = QueryEngine::new(EngineConfig::default());
        let query = filter_query();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let cancel = CancellationToken::new();
                black_box(engine.execute(&snapshot, &query, &cancel).unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_filter_strategies);
criterion_main!(benches);

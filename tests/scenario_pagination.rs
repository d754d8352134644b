//! Scenario E (`spec.md` §8): `Filter(Age > 25) -> Skip(10_000) -> Take(100)`
//! against a naive reference's rows `[10_000, 10_100)` in snapshot order.
//! Scaled down from the spec's literal 10,000,000-row fixture to 200,000
//! rows — large enough to cross several zone-map chunk boundaries and
//! still exercise a real skip/take window, small enough to build quickly.

mod common;

use columnar_engine::cancellation::CancellationToken;
use columnar_engine::config::EngineConfig;
use columnar_engine::engine::{EngineResult, QueryEngine};
use columnar_engine::predicate::CompareOp;
use columnar_engine::render::QueryResult;
use columnar_engine::translator::{Constant, SurfaceExpr, SurfaceOp, SurfaceQuery, TerminalOp};

const ROWS: usize = 200_000;

fn uniform_ages(n: usize, seed: u64) -> Vec<i32> {
    let mut state = seed | 1;
    (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 100) as i32
        })
        .collect()
}

#[test]
fn skip_take_window_matches_naive_reference_rows() {
    let ages = uniform_ages(ROWS, 0xdead_beef_1234_5678);
    let naive_ids: Vec<u64> = ages
        .iter()
        .enumerate()
        .filter(|(_, &a)| a > 25)
        .map(|(i, _)| i as u64)
        .skip(10_000)
        .take(100)
        .collect();
    assert_eq!(naive_ids.len(), 100, "fixture must have at least 10_100 matching rows");

    let store = common::age_snapshot(ages);
    let engine = QueryEngine::new(EngineConfig::default());
    let cancel = CancellationToken::new();
    let query = SurfaceQuery {
        table_name: "people".into(),
        ops: vec![
            SurfaceOp::Filter(SurfaceExpr::Compare {
                column: "age".into(),
                op: CompareOp::Gt,
                value: Constant::I64(25),
            }),
            SurfaceOp::Offset(10_000),
            SurfaceOp::Limit(100),
        ],
        terminal: TerminalOp::ToList,
    };

    let result = engine.execute(&store, &query, &cancel).unwrap();
    let EngineResult::Rows(QueryResult::Rows { selection, .. }) = result else {
        panic!("expected a row selection");
    };
    assert_eq!(selection.row_ids(), naive_ids);
}

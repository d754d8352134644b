//! Scenario B (`spec.md` §8): a 30 000-row dictionary-encoded `Name`
//! column, 10 000 each of "A"/"B"/"C", filtered on `Name = "B"`.

mod common;

use columnar_engine::cancellation::CancellationToken;
use columnar_engine::config::EngineConfig;
use columnar_engine::engine::{EngineResult, QueryEngine};
use columnar_engine::translator::{SurfaceExpr, SurfaceOp, SurfaceQuery, TerminalOp};
use columnar_engine::value::ScalarValue;
use columnar_engine::zonemap::SnapshotZoneMaps;

fn names_snapshot() -> columnar_engine::schema::Snapshot {
    let mut indices = Vec::with_capacity(30_000);
    indices.extend(std::iter::repeat(0i32).take(10_000)); // "A"
    indices.extend(std::iter::repeat(1i32).take(10_000)); // "B"
    indices.extend(std::iter::repeat(2i32).take(10_000)); // "C"
    common::dictionary_string_snapshot(indices, vec!["A", "B", "C"])
}

#[test]
fn dictionary_equality_selects_exactly_the_matching_run() {
    let store = names_snapshot();
    let engine = QueryEngine::new(EngineConfig::default());
    let cancel = CancellationToken::new();
    let query = SurfaceQuery {
        table_name: "names".into(),
        ops: vec![SurfaceOp::Filter(SurfaceExpr::StringEq {
            column: "name".into(),
            value: "B".into(),
        })],
        terminal: TerminalOp::Count,
    };
    let result = engine.execute(&store, &query, &cancel).unwrap();
    match result {
        EngineResult::Scalar(ScalarValue::U64(n)) => assert_eq!(n, 10_000),
        other => panic!("expected scalar count, got {other:?}"),
    }
}

#[test]
fn dictionary_equality_against_missing_constant_is_empty_with_no_per_row_work() {
    let store = names_snapshot();
    let engine = QueryEngine::new(EngineConfig::default());
    let cancel = CancellationToken::new();
    let query = SurfaceQuery {
        table_name: "names".into(),
        ops: vec![SurfaceOp::Filter(SurfaceExpr::StringEq {
            column: "name".into(),
            value: "Z".into(),
        })],
        terminal: TerminalOp::Count,
    };
    let result = engine.execute(&store, &query, &cancel).unwrap();
    assert!(matches!(result, EngineResult::Scalar(ScalarValue::U64(0))));
}

#[test]
fn no_zone_map_is_built_for_string_columns() {
    // §4.2: "For string and boolean columns no zone map is built."
    let store = names_snapshot();
    let zone_maps = SnapshotZoneMaps::build(&store, 16_384);
    assert!(zone_maps.get(0).is_none());
}

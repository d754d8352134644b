//! `QueryEngine`: the public entry point tying translation, plan
//! caching, optimization, physical planning and execution into one
//! call. Grounded on `datafusion::prelude::SessionContext` as the
//! one-call facade over its own translate/optimize/plan/execute
//! pipeline, scaled down to this crate's single-snapshot, synchronous
//! execution model (no catalog, no async `RecordBatchStream`).

use std::sync::Arc;

use log::{debug, trace, warn};

use crate::bitmap::BitmapPool;
use crate::cache::PlanCache;
use crate::cancellation::CancellationToken;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::executor;
use crate::physical::planner::plan_query;
use crate::plan::optimizer::{Optimizer, OptimizerContext};
use crate::render::QueryResult;
use crate::schema::{ColumnStore, Schema};
use crate::translator::{canonical_key, translate, SurfaceQuery, TerminalOp};
use crate::value::ScalarValue;
use crate::zonemap::SnapshotZoneMaps;

/// The phases a single query call passes through, logged at `trace`
/// level as the call progresses. Not retained as state between calls —
/// every `execute` is a synchronous, self-contained pass, so there is no
/// session object for a caller to poll mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryPhase {
    Submitted,
    Translated,
    Optimized,
    Planned,
    Executing,
    Completed,
    Failed,
    Canceled,
}

/// The typed outcome of running a `SurfaceQuery` to completion, folding
/// the `Any`/`First` terminals (which have no logical-plan
/// representation of their own) into their natural result shape on top
/// of the executor's raw `QueryResult`.
#[derive(Debug, Clone)]
pub enum EngineResult {
    Rows(QueryResult),
    Scalar(ScalarValue),
    Exists(bool),
    First(Option<u64>),
}

pub struct QueryEngine {
    config: EngineConfig,
    cache: PlanCache,
    pool: Arc<BitmapPool>,
}

impl QueryEngine {
    pub fn new(config: EngineConfig) -> Self {
        let cache = PlanCache::new(config.plan_cache_capacity);
        Self { config, cache, pool: BitmapPool::new() }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &PlanCache {
        &self.cache
    }

    /// Runs `query` against `store` end to end: translate (or reuse a
    /// cached plan), optimize, choose physical strategies, execute, and
    /// interpret the terminal operation.
    ///
    /// The plan cache is keyed only by `query`'s canonical form, not by
    /// `store`'s identity or row count — a `QueryEngine` is assumed to
    /// bind to one immutable snapshot for its lifetime, matching
    /// `ColumnStore`'s "engine never writes through this interface"
    /// contract. Pointing the same engine at a second, differently
    /// shaped store without clearing the cache will replay stale
    /// `Scan.exact_row_count` values.
    pub fn execute(&self, store: &dyn ColumnStore, query: &SurfaceQuery, cancellation: &CancellationToken) -> Result<EngineResult> {
        let mut phase = QueryPhase::Submitted;
        trace!("query {phase:?}: table={}", query.table_name);

        let result = self.run(store, query, cancellation, &mut phase);

        match &result {
            Ok(_) => {
                phase = QueryPhase::Completed;
                trace!("query {phase:?}");
            }
            Err(EngineError::Canceled) => {
                phase = QueryPhase::Canceled;
                debug!("query {phase:?}");
            }
            Err(e) => {
                phase = QueryPhase::Failed;
                warn!("query {phase:?}: {e}");
            }
        }
        result
    }

    fn run(
        &self,
        store: &dyn ColumnStore,
        query: &SurfaceQuery,
        cancellation: &CancellationToken,
        phase: &mut QueryPhase,
    ) -> Result<EngineResult> {
        if cancellation.is_canceled() {
            return Err(EngineError::Canceled);
        }

        let key = canonical_key(query);
        let schema = Arc::new(store.schema().clone());
        let row_count = store.row_count();
        let config = &self.config;
        let terminal = query.terminal.clone();

        let logical = self.cache.get_or_insert_with(key, || {
            let translated = translate(query, schema.clone(), row_count, config)?;
            let optimizer = Optimizer::standard();
            let zone_maps = if config.build_zone_maps { Some(SnapshotZoneMaps::build(store, config.chunk_size)) } else { None };
            let ctx = OptimizerContext { zone_maps: zone_maps.as_ref() };
            optimizer.optimize(translated.plan, &ctx)
        })?;
        *phase = QueryPhase::Translated;
        trace!("query {phase:?}");
        *phase = QueryPhase::Optimized;
        trace!("query {phase:?}");

        if cancellation.is_canceled() {
            return Err(EngineError::Canceled);
        }

        let physical = plan_query(&logical, store, config)?;
        *phase = QueryPhase::Planned;
        trace!("query {phase:?}");

        let zone_maps = if config.build_zone_maps { Some(SnapshotZoneMaps::build(store, config.chunk_size)) } else { None };

        *phase = QueryPhase::Executing;
        trace!("query {phase:?}");
        let raw = executor::execute(&physical, store, config, zone_maps.as_ref(), &self.pool, cancellation)?;

        Ok(interpret_terminal(raw, &terminal))
    }
}

/// Folds `Any`/`First` into their natural shape; every other terminal
/// passes the executor's result through unchanged (`ToList`/`ToArray`
/// as `Rows`, the aggregate terminals as `Scalar`).
fn interpret_terminal(result: QueryResult, terminal: &TerminalOp) -> EngineResult {
    match terminal {
        TerminalOp::Any => match &result {
            QueryResult::Rows { selection, .. } => EngineResult::Exists(selection.row_count() > 0),
            QueryResult::Group(table) => EngineResult::Exists(!table.rows.is_empty()),
            QueryResult::Scalar(_) => EngineResult::Exists(true),
        },
        TerminalOp::First => match &result {
            QueryResult::Rows { selection, .. } => EngineResult::First(selection.row_ids().into_iter().next()),
            _ => EngineResult::First(None),
        },
        TerminalOp::Sum(_) | TerminalOp::Average(_) | TerminalOp::Min(_) | TerminalOp::Max(_) | TerminalOp::Count => {
            match result {
                QueryResult::Scalar(v) => EngineResult::Scalar(v),
                other => EngineResult::Rows(other),
            }
        }
        TerminalOp::ToList | TerminalOp::ToArray => EngineResult::Rows(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, Encoding, LogicalType};
    use crate::translator::{Constant, SurfaceExpr, SurfaceOp};
    use arrow_array::{ArrayRef, Int32Array};

    struct FakeStore {
        schema: Schema,
        columns: Vec<ArrayRef>,
    }
    impl ColumnStore for FakeStore {
        fn schema(&self) -> &Schema {
            &self.schema
        }
        fn row_count(&self) -> u64 {
            self.columns[0].len() as u64
        }
        fn column(&self, index: usize) -> crate::schema::ColumnRef<'_> {
            crate::schema::ColumnRef {
                array: &self.columns[index],
                def: &self.schema.columns()[index],
            }
        }
        fn dictionary_of(&self, _index: usize) -> Option<(&ArrayRef, &ArrayRef)> {
            None
        }
    }

    fn store() -> FakeStore {
        let arr: ArrayRef = Arc::new(Int32Array::from((0..1000).collect::<Vec<i32>>()));
        FakeStore {
            schema: Schema::new(vec![ColumnDef {
                name: "age".into(),
                logical_type: LogicalType::I32,
                nullable: false,
                encoding: Encoding::Plain,
            }]),
            columns: vec![arr],
        }
    }

    #[test]
    fn count_query_returns_scalar_and_caches_plan() {
        let engine = QueryEngine::new(EngineConfig::default());
        let store = store();
        let query = SurfaceQuery {
            table_name: "t".into(),
            ops: vec![SurfaceOp::Filter(SurfaceExpr::Compare {
                column: "age".into(),
                op: crate::predicate::CompareOp::Ge,
                value: Constant::I64(500),
            })],
            terminal: TerminalOp::Count,
        };
        let cancel = CancellationToken::new();
        let result = engine.execute(&store, &query, &cancel).unwrap();
        match result {
            EngineResult::Scalar(ScalarValue::U64(n)) => assert_eq!(n, 500),
            other => panic!("expected scalar count, got {other:?}"),
        }
        assert_eq!(engine.cache().misses(), 1);
        engine.execute(&store, &query, &cancel).unwrap();
        assert_eq!(engine.cache().hits(), 1);
    }

    #[test]
    fn any_terminal_reports_existence() {
        let engine = QueryEngine::new(EngineConfig::default());
        let store = store();
        let query = SurfaceQuery {
            table_name: "t".into(),
            ops: vec![SurfaceOp::Filter(SurfaceExpr::Compare {
                column: "age".into(),
                op: crate::predicate::CompareOp::Gt,
                value: Constant::I64(999_999),
            })],
            terminal: TerminalOp::Any,
        };
        let cancel = CancellationToken::new();
        let result = engine.execute(&store, &query, &cancel).unwrap();
        assert!(matches!(result, EngineResult::Exists(false)));
    }

    #[test]
    fn canceled_before_start_short_circuits() {
        let engine = QueryEngine::new(EngineConfig::default());
        let store = store();
        let query = SurfaceQuery {
            table_name: "t".into(),
            ops: vec![],
            terminal: TerminalOp::Count,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = engine.execute(&store, &query, &cancel);
        assert!(matches!(result, Err(EngineError::Canceled)));
    }
}

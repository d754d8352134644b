//! The executor: walks a `PhysicalPlan` bottom-up, running one kernel per
//! node and threading its output into the next. Grounded on
//! `datafusion-physical-plan`'s `ExecutionPlan::execute` recursion, with
//! one departure the teacher's streaming `RecordBatchStream` model
//! doesn't need here — this engine's working set is always "the next
//! stage's whole input", so each node runs to completion and hands its
//! caller a finished [`Stage`] rather than a stream of partial batches.

pub mod kernels;

mod aggregate;
mod distinct;
mod filter;
mod group_by;
mod order;

use std::sync::Arc;

use crate::bitmap::{BitmapPool, Initial, SelectionBitmap};
use crate::cancellation::CancellationToken;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::physical::PhysicalPlan;
use crate::plan::Projection;
use crate::render::{ExecutionMetadata, GroupTable, QueryResult, RowSelection};
use crate::schema::ColumnStore;
use crate::value::ScalarValue;
use crate::zonemap::SnapshotZoneMaps;

/// The columnar intermediate stage: a selection bitmap over the
/// snapshot's rows, an explicit row order once `Sort`/`Distinct` impose
/// one, and the `Project` list the final result should read through.
#[derive(Debug, Clone)]
struct ColumnarStage {
    bitmap: SelectionBitmap,
    order: Option<Vec<u64>>,
    projection: Option<Vec<Projection>>,
}

/// What one subtree of the physical plan has produced so far. A node
/// that does not match its input's stage kind (e.g. `Aggregate` over a
/// `Group` stage) is a plan-construction bug the translator/optimizer
/// should have prevented, surfaced as `InternalInvariantViolation`
/// rather than silently coerced.
#[derive(Debug, Clone)]
enum Stage {
    Columnar(ColumnarStage),
    Group(GroupTable),
    Scalar(ScalarValue),
}

fn as_columnar(stage: Stage) -> Result<ColumnarStage> {
    match stage {
        Stage::Columnar(cs) => Ok(cs),
        _ => Err(EngineError::InternalInvariantViolation(
            "expected a columnar stage but found a group or scalar stage".into(),
        )),
    }
}

fn as_group(stage: Stage) -> Result<GroupTable> {
    match stage {
        Stage::Group(t) => Ok(t),
        _ => Err(EngineError::InternalInvariantViolation(
            "expected a group stage but found a columnar or scalar stage".into(),
        )),
    }
}

fn run(
    plan: &PhysicalPlan,
    store: &dyn ColumnStore,
    config: &EngineConfig,
    zone_maps: Option<&SnapshotZoneMaps>,
    pool: &Arc<BitmapPool>,
    cancellation: &CancellationToken,
) -> Result<Stage> {
    Ok(match plan {
        PhysicalPlan::Scan { row_count, .. } => Stage::Columnar(ColumnarStage {
            bitmap: SelectionBitmap::new(*row_count as usize, Initial::AllOne),
            order: None,
            projection: None,
        }),

        PhysicalPlan::Filter { child, predicates, strategy, fallback } => {
            let mut cs = as_columnar(run(child, store, config, zone_maps, pool, cancellation)?)?;
            if *fallback {
                return Err(EngineError::UnsupportedOperation(
                    "row-at-a-time fallback filtering has no columnar kernel; the renderer path \
                     this defers to is not wired up"
                        .into(),
                ));
            }
            filter::apply(store, &mut cs.bitmap, predicates, *strategy, config, zone_maps, pool, cancellation)?;
            Stage::Columnar(cs)
        }

        PhysicalPlan::FusedFilterAggregate { predicates, op, column, output_type, strategy, .. } => {
            let scalar = aggregate::fused_filter_aggregate(
                store,
                store.row_count(),
                predicates,
                *op,
                *column,
                *output_type,
                *strategy,
                config,
                zone_maps,
                pool,
                cancellation,
            )?;
            Stage::Scalar(scalar)
        }

        PhysicalPlan::Project { child, projections } => {
            match run(child, store, config, zone_maps, pool, cancellation)? {
                Stage::Columnar(mut cs) => {
                    cs.projection = Some(projections.clone());
                    Stage::Columnar(cs)
                }
                Stage::Group(table) => Stage::Group(group_by::project(table, projections)?),
                Stage::Scalar(v) => Stage::Scalar(v),
            }
        }

        PhysicalPlan::Aggregate { child, op, column, output_type, strategy } => {
            let cs = as_columnar(run(child, store, config, zone_maps, pool, cancellation)?)?;
            Stage::Scalar(aggregate::aggregate(store, &cs.bitmap, *op, *column, *output_type, *strategy, config, cancellation)?)
        }

        PhysicalPlan::GroupBy { child, group_column, key_type, aggregations, strategy } => {
            let cs = as_columnar(run(child, store, config, zone_maps, pool, cancellation)?)?;
            let schema = plan.output_schema();
            let sorted = *strategy == crate::physical::GroupByStrategy::Sorted;
            Stage::Group(group_by::execute(store, &cs.bitmap, *group_column, *key_type, aggregations, sorted, schema)?)
        }

        PhysicalPlan::Limit { child, count } => match run(child, store, config, zone_maps, pool, cancellation)? {
            Stage::Columnar(mut cs) => {
                match cs.order.take() {
                    Some(ids) => cs.order = Some(order::limit_ids(ids, *count)),
                    None => cs.bitmap = order::limit_bitmap(&cs.bitmap, *count),
                }
                Stage::Columnar(cs)
            }
            Stage::Group(table) => Stage::Group(group_by::limit(table, *count as usize)),
            Stage::Scalar(v) => Stage::Scalar(v),
        },

        PhysicalPlan::Offset { child, count } => match run(child, store, config, zone_maps, pool, cancellation)? {
            Stage::Columnar(mut cs) => {
                match cs.order.take() {
                    Some(ids) => cs.order = Some(order::offset_ids(ids, *count)),
                    None => cs.bitmap = order::offset_bitmap(&cs.bitmap, *count),
                }
                Stage::Columnar(cs)
            }
            Stage::Group(table) => Stage::Group(group_by::offset(table, *count as usize)),
            Stage::Scalar(v) => Stage::Scalar(v),
        },

        PhysicalPlan::Sort { child, orderings } => {
            let stage = run(child, store, config, zone_maps, pool, cancellation)?;
            if cancellation.is_canceled() {
                return Err(EngineError::Canceled);
            }
            match stage {
                Stage::Columnar(mut cs) => {
                    cs.order = Some(order::sort(store, &cs.bitmap, orderings));
                    Stage::Columnar(cs)
                }
                Stage::Group(table) => Stage::Group(group_by::sort(table, orderings)),
                Stage::Scalar(v) => Stage::Scalar(v),
            }
        }

        PhysicalPlan::Distinct { child } => {
            let stage = run(child, store, config, zone_maps, pool, cancellation)?;
            if cancellation.is_canceled() {
                return Err(EngineError::Canceled);
            }
            match stage {
                Stage::Columnar(mut cs) => {
                    let ids = cs.order.clone().unwrap_or_else(|| cs.bitmap.get_selected_indices());
                    cs.order = Some(distinct::distinct_rows(store, ids));
                    Stage::Columnar(cs)
                }
                Stage::Group(table) => Stage::Group(group_by::distinct(table)),
                Stage::Scalar(v) => Stage::Scalar(v),
            }
        }
    })
}

/// Runs `plan` against `store` to completion and returns the terminal
/// `QueryResult`. This is the executor's sole public entry point; every
/// node kind above is an internal stage in service of this call.
pub fn execute(
    plan: &PhysicalPlan,
    store: &dyn ColumnStore,
    config: &EngineConfig,
    zone_maps: Option<&SnapshotZoneMaps>,
    pool: &Arc<BitmapPool>,
    cancellation: &CancellationToken,
) -> Result<QueryResult> {
    Ok(match run(plan, store, config, zone_maps, pool, cancellation)? {
        Stage::Scalar(v) => QueryResult::Scalar(v),
        Stage::Group(table) => QueryResult::Group(table),
        Stage::Columnar(cs) => {
            let selection = match cs.order {
                Some(ids) => RowSelection::SortedIds(ids),
                None => RowSelection::Bitmap(cs.bitmap),
            };
            QueryResult::Rows {
                selection,
                projection: cs.projection,
                metadata: ExecutionMetadata::default(),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physical::{AggregateStrategy, FilterStrategy, PhysicalPlanner};
    use crate::plan::{AggregateOp, LogicalPlanNode};
    use crate::predicate::{CompareOp, NumericComparisonPredicate, NumericConstant};
    use crate::schema::{ColumnDef, Encoding, LogicalType, Schema, SchemaRef};
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

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![ColumnDef {
            name: "n".into(),
            logical_type: LogicalType::I32,
            nullable: false,
            encoding: Encoding::Plain,
        }]))
    }

    fn store_of(values: Vec<i32>) -> FakeStore {
        let arr: ArrayRef = Arc::new(Int32Array::from(values));
        FakeStore {
            schema: Schema::new(vec![ColumnDef {
                name: "n".into(),
                logical_type: LogicalType::I32,
                nullable: false,
                encoding: Encoding::Plain,
            }]),
            columns: vec![arr],
        }
    }

    #[test]
    fn scan_then_filter_then_count_matches_manual_count() {
        let store = store_of((0..1000).collect());
        let scan = Arc::new(LogicalPlanNode::scan("t", schema(), 1000));
        let pred = Arc::new(
            NumericComparisonPredicate::try_new(0, LogicalType::I32, CompareOp::Gt, NumericConstant::I64(499)).unwrap(),
        );
        let filter = Arc::new(LogicalPlanNode::filter(scan, vec![pred], 0.5).unwrap());
        let agg = LogicalPlanNode::aggregate(filter, AggregateOp::Count, None, LogicalType::I64).unwrap();
        let config = EngineConfig::default();
        let physical = PhysicalPlanner::new(&config).plan(&agg, &store).unwrap();
        let pool = BitmapPool::new();
        let cancel = CancellationToken::new();
        let result = execute(&physical, &store, &config, None, &pool, &cancel).unwrap();
        match result {
            QueryResult::Scalar(ScalarValue::U64(n)) => assert_eq!(n, 500),
            other => panic!("expected scalar count, got {other:?}"),
        }
    }

    #[test]
    fn limit_after_filter_keeps_first_n_survivors() {
        let store = store_of((0..100).collect());
        let scan = Arc::new(LogicalPlanNode::scan("t", schema(), 100));
        let pred = Arc::new(
            NumericComparisonPredicate::try_new(0, LogicalType::I32, CompareOp::Ge, NumericConstant::I64(10)).unwrap(),
        );
        let filter = Arc::new(LogicalPlanNode::filter(scan, vec![pred], 0.9).unwrap());
        let limited = LogicalPlanNode::limit(filter, 3);
        let config = EngineConfig::default();
        let physical = PhysicalPlanner::new(&config).plan(&limited, &store).unwrap();
        let pool = BitmapPool::new();
        let cancel = CancellationToken::new();
        let result = execute(&physical, &store, &config, None, &pool, &cancel).unwrap();
        match result {
            QueryResult::Rows { selection, .. } => assert_eq!(selection.row_ids(), vec![10, 11, 12]),
            other => panic!("expected rows, got {other:?}"),
        }
    }
}

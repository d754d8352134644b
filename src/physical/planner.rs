//! Physical planner: chooses an execution strategy per logical operator
//! from estimated row count and the engine's configured thresholds.
//! Grounded on `datafusion`'s split between `LogicalPlan` and
//! `ExecutionPlan` (`physical_plan/planner.rs`), scaled down to this
//! crate's closed strategy set (Sequential/SIMD/Parallel,
//! Hash/SortedAggregate) since there is no cost-based join-order search
//! here — only per-operator threshold lookups.

use std::sync::Arc;

use log::debug;

use super::{AggregateStrategy, FilterStrategy, GroupByStrategy, PhysicalPlan};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::plan::LogicalPlanNode;
use crate::schema::ColumnStore;

pub struct PhysicalPlanner<'a> {
    config: &'a EngineConfig,
}

impl<'a> PhysicalPlanner<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub fn plan(&self, node: &LogicalPlanNode, store: &dyn ColumnStore) -> Result<PhysicalPlan> {
        Ok(match node {
            LogicalPlanNode::Scan { schema, exact_row_count, .. } => PhysicalPlan::Scan {
                schema: schema.clone(),
                row_count: *exact_row_count,
            },
            LogicalPlanNode::Filter {
                child,
                predicates,
                fused_with_parent_aggregate,
                fallback,
                ..
            } => {
                let child_plan = self.plan(child, store)?;
                let strategy = self.filter_strategy(node.estimated_row_count());
                debug!(
                    "physical planner: Filter({} predicates) -> {:?} (fused_with_parent={})",
                    predicates.len(),
                    strategy,
                    fused_with_parent_aggregate
                );
                PhysicalPlan::Filter {
                    child: Box::new(child_plan),
                    predicates: predicates.clone(),
                    strategy,
                    fallback: *fallback,
                }
            }
            LogicalPlanNode::Project { child, projections } => PhysicalPlan::Project {
                child: Box::new(self.plan(child, store)?),
                projections: projections.clone(),
            },
            LogicalPlanNode::Aggregate { child, op, column, output_type } => {
                // Fused-filter-aggregate: the child is a Filter the
                // optimizer tagged `fused_with_parent_aggregate`. Replace
                // the pair with a single kernel rather than planning the
                // Filter independently.
                if let LogicalPlanNode::Filter {
                    child: filter_child,
                    predicates,
                    fused_with_parent_aggregate: true,
                    fallback: false,
                    ..
                } = child.as_ref()
                {
                    let strategy = self.aggregate_strategy(filter_child.estimated_row_count());
                    debug!("physical planner: FusedFilterAggregate({op:?}) -> {strategy:?}");
                    return Ok(PhysicalPlan::FusedFilterAggregate {
                        child: Box::new(self.plan(filter_child, store)?),
                        predicates: predicates.clone(),
                        op: *op,
                        column: *column,
                        output_type: *output_type,
                        strategy,
                    });
                }
                let child_plan = self.plan(child, store)?;
                let strategy = self.aggregate_strategy(child.estimated_row_count());
                debug!("physical planner: Aggregate({op:?}) -> {strategy:?}");
                PhysicalPlan::Aggregate {
                    child: Box::new(child_plan),
                    op: *op,
                    column: *column,
                    output_type: *output_type,
                    strategy,
                }
            }
            LogicalPlanNode::GroupBy {
                child,
                group_column,
                key_type,
                aggregations,
            } => {
                let child_plan = self.plan(child, store)?;
                let strategy = if store.sorted_hint(*group_column) {
                    GroupByStrategy::Sorted
                } else {
                    GroupByStrategy::Hash
                };
                debug!("physical planner: GroupBy(col={group_column}) -> {strategy:?}");
                PhysicalPlan::GroupBy {
                    child: Box::new(child_plan),
                    group_column: *group_column,
                    key_type: *key_type,
                    aggregations: aggregations.clone(),
                    strategy,
                }
            }
            LogicalPlanNode::Limit { child, count } => PhysicalPlan::Limit {
                child: Box::new(self.plan(child, store)?),
                count: *count,
            },
            LogicalPlanNode::Offset { child, count } => PhysicalPlan::Offset {
                child: Box::new(self.plan(child, store)?),
                count: *count,
            },
            LogicalPlanNode::Sort { child, orderings } => PhysicalPlan::Sort {
                child: Box::new(self.plan(child, store)?),
                orderings: orderings.clone(),
            },
            LogicalPlanNode::Distinct { child } => PhysicalPlan::Distinct {
                child: Box::new(self.plan(child, store)?),
            },
        })
    }

    fn filter_strategy(&self, estimated_rows: u64) -> FilterStrategy {
        if estimated_rows < 1_000 {
            FilterStrategy::Sequential
        } else if estimated_rows >= self.config.parallel_row_threshold {
            FilterStrategy::Parallel
        } else {
            FilterStrategy::Simd
        }
    }

    fn aggregate_strategy(&self, estimated_rows: u64) -> AggregateStrategy {
        if estimated_rows < 1_000 {
            AggregateStrategy::Sequential
        } else if estimated_rows >= self.config.parallel_row_threshold {
            AggregateStrategy::Parallel
        } else {
            AggregateStrategy::Simd
        }
    }
}

/// Convenience entry point mirroring `PhysicalPlanner::new(config).plan(..)`,
/// used by the engine's top-level query path.
pub fn plan_query(node: &LogicalPlanNode, store: &dyn ColumnStore, config: &EngineConfig) -> Result<Arc<PhysicalPlan>> {
    Ok(Arc::new(PhysicalPlanner::new(config).plan(node, store)?))
}

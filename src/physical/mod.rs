//! Physical plan: the logical plan's operators paired with a chosen
//! execution strategy. Strategy is metadata only — operator semantics are
//! identical across Sequential/SIMD/Parallel/Hash/Sorted; the physical
//! planner is the only place that reads the row-count thresholds that
//! pick between them.

pub mod planner;

pub use planner::PhysicalPlanner;

use std::sync::Arc;

use crate::plan::{AggregateOp, GroupAggregation, Projection, SortKey};
use crate::predicate::ColumnPredicate;
use crate::schema::{LogicalType, SchemaRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStrategy {
    Sequential,
    Simd,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateStrategy {
    Sequential,
    Simd,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupByStrategy {
    Hash,
    Sorted,
}

#[derive(Debug, Clone)]
pub enum PhysicalPlan {
    Scan {
        schema: SchemaRef,
        row_count: u64,
    },
    Filter {
        child: Box<PhysicalPlan>,
        predicates: Vec<Arc<dyn ColumnPredicate>>,
        strategy: FilterStrategy,
        fallback: bool,
    },
    /// Evaluates `predicates` chunk-by-chunk and folds surviving rows
    /// directly into the aggregate accumulator, without materializing an
    /// intermediate selection bitmap for the chunk. Chosen in place of a
    /// separate `Filter`+`Aggregate` pair when the logical optimizer
    /// marked the Filter fused with its parent Aggregate.
    FusedFilterAggregate {
        child: Box<PhysicalPlan>,
        predicates: Vec<Arc<dyn ColumnPredicate>>,
        op: AggregateOp,
        column: Option<usize>,
        output_type: LogicalType,
        strategy: AggregateStrategy,
    },
    Project {
        child: Box<PhysicalPlan>,
        projections: Vec<Projection>,
    },
    Aggregate {
        child: Box<PhysicalPlan>,
        op: AggregateOp,
        column: Option<usize>,
        output_type: LogicalType,
        strategy: AggregateStrategy,
    },
    GroupBy {
        child: Box<PhysicalPlan>,
        group_column: usize,
        key_type: LogicalType,
        aggregations: Vec<GroupAggregation>,
        strategy: GroupByStrategy,
    },
    Limit {
        child: Box<PhysicalPlan>,
        count: u64,
    },
    Offset {
        child: Box<PhysicalPlan>,
        count: u64,
    },
    Sort {
        child: Box<PhysicalPlan>,
        orderings: Vec<SortKey>,
    },
    Distinct {
        child: Box<PhysicalPlan>,
    },
}

impl PhysicalPlan {
    pub fn child(&self) -> Option<&PhysicalPlan> {
        match self {
            PhysicalPlan::Scan { .. } => None,
            PhysicalPlan::Filter { child, .. }
            | PhysicalPlan::FusedFilterAggregate { child, .. }
            | PhysicalPlan::Project { child, .. }
            | PhysicalPlan::Aggregate { child, .. }
            | PhysicalPlan::GroupBy { child, .. }
            | PhysicalPlan::Limit { child, .. }
            | PhysicalPlan::Offset { child, .. }
            | PhysicalPlan::Sort { child, .. }
            | PhysicalPlan::Distinct { child } => Some(child),
        }
    }

    /// The schema a consumer of this node's output observes. Mirrors
    /// `LogicalPlanNode::output_schema` — kept in lockstep because every
    /// `PhysicalPlan` variant is built from exactly one logical node.
    pub fn output_schema(&self) -> SchemaRef {
        use crate::schema::{ColumnDef, Encoding, Schema};
        match self {
            PhysicalPlan::Scan { schema, .. } => schema.clone(),
            PhysicalPlan::Project { child, projections } => {
                let child_schema = child.output_schema();
                let columns = projections
                    .iter()
                    .map(|p| match p {
                        Projection::Column { source, output_name } => {
                            let mut def = child_schema.columns()[*source].clone();
                            def.name = output_name.clone();
                            def
                        }
                        Projection::Computed { output_name, output_type } => ColumnDef {
                            name: output_name.clone(),
                            logical_type: *output_type,
                            nullable: true,
                            encoding: Encoding::Plain,
                        },
                    })
                    .collect();
                Arc::new(Schema::new(columns))
            }
            PhysicalPlan::Aggregate { op, output_type, .. } | PhysicalPlan::FusedFilterAggregate { op, output_type, .. } => {
                let name = match op {
                    AggregateOp::Count => "count",
                    AggregateOp::Sum => "sum",
                    AggregateOp::Avg => "avg",
                    AggregateOp::Min => "min",
                    AggregateOp::Max => "max",
                };
                Arc::new(Schema::new(vec![ColumnDef {
                    name: name.to_string(),
                    logical_type: *output_type,
                    nullable: false,
                    encoding: Encoding::Plain,
                }]))
            }
            PhysicalPlan::GroupBy { child, key_type, aggregations, .. } => {
                let child_schema = child.output_schema();
                let columns = aggregations
                    .iter()
                    .map(|agg| match agg {
                        GroupAggregation::Key => ColumnDef {
                            name: "key".into(),
                            logical_type: *key_type,
                            nullable: false,
                            encoding: Encoding::Plain,
                        },
                        GroupAggregation::Count { output_name } => ColumnDef {
                            name: output_name.clone(),
                            logical_type: LogicalType::I64,
                            nullable: false,
                            encoding: Encoding::Plain,
                        },
                        GroupAggregation::Sum { column, output_name }
                        | GroupAggregation::Min { column, output_name }
                        | GroupAggregation::Max { column, output_name } => ColumnDef {
                            name: output_name.clone(),
                            logical_type: child_schema.columns()[*column].logical_type,
                            nullable: false,
                            encoding: Encoding::Plain,
                        },
                        GroupAggregation::Avg { output_name, .. } => ColumnDef {
                            name: output_name.clone(),
                            logical_type: LogicalType::F64,
                            nullable: false,
                            encoding: Encoding::Plain,
                        },
                    })
                    .collect();
                Arc::new(Schema::new(columns))
            }
            PhysicalPlan::Filter { child, .. }
            | PhysicalPlan::Limit { child, .. }
            | PhysicalPlan::Offset { child, .. }
            | PhysicalPlan::Sort { child, .. }
            | PhysicalPlan::Distinct { child } => child.output_schema(),
        }
    }
}

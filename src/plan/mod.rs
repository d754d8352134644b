//! Logical plan: an immutable tree of node kinds representing WHAT a query
//! computes. Grounded on `datafusion-expr`'s `LogicalPlan` enum — one
//! variant per relational operator, each carrying its own output schema and
//! a row-count estimate rather than deriving them lazily at use sites.

mod display;
pub mod optimizer;
pub mod selectivity;
mod visitor;

pub use display::display_indent;
pub use visitor::TreeNode;

use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::predicate::ColumnPredicate;
use crate::schema::{Schema, SchemaRef};

/// An aggregate function over a single (nullable-for-Count) column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// One output member of a `Project`: either a straight column reference
/// (rename allowed, no computation) or an opaque computed expression the
/// executor defers to the renderer.
#[derive(Debug, Clone)]
pub enum Projection {
    Column { source: usize, output_name: String },
    Computed { output_name: String, output_type: crate::schema::LogicalType },
}

/// One member of a `GroupBy`'s output shape.
#[derive(Debug, Clone)]
pub enum GroupAggregation {
    Key,
    Count { output_name: String },
    Sum { column: usize, output_name: String },
    Avg { column: usize, output_name: String },
    Min { column: usize, output_name: String },
    Max { column: usize, output_name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct SortKey {
    pub column: usize,
    pub direction: SortDirection,
}

/// A node in the logical plan tree. Every variant is immutable once built —
/// constructors validate that referenced columns exist in the child's
/// output schema and fail with `PlanConstruction` otherwise, per the
/// invariant that a malformed reference is caught at build time, not at
/// execution time.
#[derive(Debug, Clone)]
pub enum LogicalPlanNode {
    Scan {
        table_name: String,
        schema: SchemaRef,
        exact_row_count: u64,
    },
    Filter {
        child: Arc<LogicalPlanNode>,
        predicates: Vec<Arc<dyn ColumnPredicate>>,
        estimated_selectivity: f64,
        /// Set by the optimizer's fused-operator-marking rule when this
        /// Filter's parent is an Aggregate with no intervening node.
        fused_with_parent_aggregate: bool,
        /// Set when the translator could not lower one of this filter's
        /// predicates under `strictPredicate = false`; execution defers
        /// the entire node to the renderer's row-at-a-time path.
        fallback: bool,
    },
    Project {
        child: Arc<LogicalPlanNode>,
        projections: Vec<Projection>,
    },
    Aggregate {
        child: Arc<LogicalPlanNode>,
        op: AggregateOp,
        column: Option<usize>,
        output_type: crate::schema::LogicalType,
    },
    GroupBy {
        child: Arc<LogicalPlanNode>,
        group_column: usize,
        key_type: crate::schema::LogicalType,
        aggregations: Vec<GroupAggregation>,
    },
    Limit {
        child: Arc<LogicalPlanNode>,
        count: u64,
    },
    Offset {
        child: Arc<LogicalPlanNode>,
        count: u64,
    },
    Sort {
        child: Arc<LogicalPlanNode>,
        orderings: Vec<SortKey>,
    },
    Distinct {
        child: Arc<LogicalPlanNode>,
    },
}

impl LogicalPlanNode {
    pub fn scan(table_name: impl Into<String>, schema: SchemaRef, exact_row_count: u64) -> Self {
        LogicalPlanNode::Scan {
            table_name: table_name.into(),
            schema,
            exact_row_count,
        }
    }

    pub fn filter(
        child: Arc<LogicalPlanNode>,
        predicates: Vec<Arc<dyn ColumnPredicate>>,
        estimated_selectivity: f64,
    ) -> Result<Self> {
        if predicates.is_empty() {
            return Err(EngineError::PlanConstruction(
                "Filter requires at least one predicate".into(),
            ));
        }
        let schema = child.output_schema();
        for p in &predicates {
            if let Some(idx) = p.column_index() {
                if idx >= schema.len() {
                    return Err(EngineError::PlanConstruction(format!(
                        "Filter predicate references column index {idx} outside child schema of {} columns",
                        schema.len()
                    )));
                }
            }
        }
        Ok(LogicalPlanNode::Filter {
            child,
            predicates,
            estimated_selectivity,
            fused_with_parent_aggregate: false,
            fallback: false,
        })
    }

    pub fn filter_fallback(child: Arc<LogicalPlanNode>) -> Self {
        LogicalPlanNode::Filter {
            child,
            predicates: Vec::new(),
            estimated_selectivity: 1.0,
            fused_with_parent_aggregate: false,
            fallback: true,
        }
    }

    pub fn project(child: Arc<LogicalPlanNode>, projections: Vec<Projection>) -> Result<Self> {
        let schema = child.output_schema();
        for p in &projections {
            if let Projection::Column { source, .. } = p {
                if *source >= schema.len() {
                    return Err(EngineError::PlanConstruction(format!(
                        "Project references column index {source} outside child schema of {} columns",
                        schema.len()
                    )));
                }
            }
        }
        Ok(LogicalPlanNode::Project { child, projections })
    }

    pub fn aggregate(
        child: Arc<LogicalPlanNode>,
        op: AggregateOp,
        column: Option<usize>,
        output_type: crate::schema::LogicalType,
    ) -> Result<Self> {
        if op == AggregateOp::Count && column.is_none() {
            // Count is the only aggregate allowed a null column.
        } else if column.is_none() {
            return Err(EngineError::PlanConstruction(format!(
                "aggregate {op:?} requires a bound column"
            )));
        }
        if let Some(idx) = column {
            if idx >= child.output_schema().len() {
                return Err(EngineError::PlanConstruction(format!(
                    "Aggregate references column index {idx} outside child schema"
                )));
            }
        }
        Ok(LogicalPlanNode::Aggregate {
            child,
            op,
            column,
            output_type,
        })
    }

    pub fn group_by(
        child: Arc<LogicalPlanNode>,
        group_column: usize,
        key_type: crate::schema::LogicalType,
        aggregations: Vec<GroupAggregation>,
    ) -> Result<Self> {
        let schema = child.output_schema();
        if group_column >= schema.len() {
            return Err(EngineError::PlanConstruction(format!(
                "GroupBy key references column index {group_column} outside child schema"
            )));
        }
        for agg in &aggregations {
            let col = match agg {
                GroupAggregation::Key | GroupAggregation::Count { .. } => None,
                GroupAggregation::Sum { column, .. }
                | GroupAggregation::Avg { column, .. }
                | GroupAggregation::Min { column, .. }
                | GroupAggregation::Max { column, .. } => Some(*column),
            };
            if let Some(idx) = col {
                if idx >= schema.len() {
                    return Err(EngineError::PlanConstruction(format!(
                        "GroupBy aggregation references column index {idx} outside child schema"
                    )));
                }
            }
        }
        Ok(LogicalPlanNode::GroupBy {
            child,
            group_column,
            key_type,
            aggregations,
        })
    }

    pub fn limit(child: Arc<LogicalPlanNode>, count: u64) -> Self {
        LogicalPlanNode::Limit { child, count }
    }

    pub fn offset(child: Arc<LogicalPlanNode>, count: u64) -> Self {
        LogicalPlanNode::Offset { child, count }
    }

    pub fn sort(child: Arc<LogicalPlanNode>, orderings: Vec<SortKey>) -> Result<Self> {
        let schema = child.output_schema();
        for key in &orderings {
            if key.column >= schema.len() {
                return Err(EngineError::PlanConstruction(format!(
                    "Sort references column index {} outside child schema",
                    key.column
                )));
            }
        }
        Ok(LogicalPlanNode::Sort { child, orderings })
    }

    pub fn distinct(child: Arc<LogicalPlanNode>) -> Self {
        LogicalPlanNode::Distinct { child }
    }

    pub fn child(&self) -> Option<&Arc<LogicalPlanNode>> {
        match self {
            LogicalPlanNode::Scan { .. } => None,
            LogicalPlanNode::Filter { child, .. }
            | LogicalPlanNode::Project { child, .. }
            | LogicalPlanNode::Aggregate { child, .. }
            | LogicalPlanNode::GroupBy { child, .. }
            | LogicalPlanNode::Limit { child, .. }
            | LogicalPlanNode::Offset { child, .. }
            | LogicalPlanNode::Sort { child, .. }
            | LogicalPlanNode::Distinct { child } => Some(child),
        }
    }

    /// The schema a consumer of this node's output observes.
    pub fn output_schema(&self) -> SchemaRef {
        match self {
            LogicalPlanNode::Scan { schema, .. } => schema.clone(),
            LogicalPlanNode::Project { child, projections } => {
                let child_schema = child.output_schema();
                let columns = projections
                    .iter()
                    .map(|p| match p {
                        Projection::Column { source, output_name } => {
                            let mut def = child_schema.columns()[*source].clone();
                            def.name = output_name.clone();
                            def
                        }
                        Projection::Computed { output_name, output_type } => crate::schema::ColumnDef {
                            name: output_name.clone(),
                            logical_type: *output_type,
                            nullable: true,
                            encoding: crate::schema::Encoding::Plain,
                        },
                    })
                    .collect();
                Arc::new(Schema::new(columns))
            }
            LogicalPlanNode::Aggregate { op, output_type, .. } => {
                let name = match op {
                    AggregateOp::Count => "count",
                    AggregateOp::Sum => "sum",
                    AggregateOp::Avg => "avg",
                    AggregateOp::Min => "min",
                    AggregateOp::Max => "max",
                };
                Arc::new(Schema::new(vec![crate::schema::ColumnDef {
                    name: name.to_string(),
                    logical_type: *output_type,
                    nullable: false,
                    encoding: crate::schema::Encoding::Plain,
                }]))
            }
            LogicalPlanNode::GroupBy {
                child,
                key_type,
                aggregations,
                ..
            } => {
                let child_schema = child.output_schema();
                let mut columns = Vec::with_capacity(aggregations.len());
                for agg in aggregations {
                    let def = match agg {
                        GroupAggregation::Key => crate::schema::ColumnDef {
                            name: "key".into(),
                            logical_type: *key_type,
                            nullable: false,
                            encoding: crate::schema::Encoding::Plain,
                        },
                        GroupAggregation::Count { output_name } => crate::schema::ColumnDef {
                            name: output_name.clone(),
                            logical_type: crate::schema::LogicalType::I64,
                            nullable: false,
                            encoding: crate::schema::Encoding::Plain,
                        },
                        GroupAggregation::Sum { column, output_name }
                        | GroupAggregation::Min { column, output_name }
                        | GroupAggregation::Max { column, output_name } => crate::schema::ColumnDef {
                            name: output_name.clone(),
                            logical_type: child_schema.columns()[*column].logical_type,
                            nullable: false,
                            encoding: crate::schema::Encoding::Plain,
                        },
                        GroupAggregation::Avg { output_name, .. } => crate::schema::ColumnDef {
                            name: output_name.clone(),
                            logical_type: crate::schema::LogicalType::F64,
                            nullable: false,
                            encoding: crate::schema::Encoding::Plain,
                        },
                    };
                    columns.push(def);
                }
                Arc::new(Schema::new(columns))
            }
            LogicalPlanNode::Filter { child, .. }
            | LogicalPlanNode::Limit { child, .. }
            | LogicalPlanNode::Offset { child, .. }
            | LogicalPlanNode::Sort { child, .. }
            | LogicalPlanNode::Distinct { child } => child.output_schema(),
        }
    }

    /// A best-effort cardinality estimate; exact only for `Scan`.
    pub fn estimated_row_count(&self) -> u64 {
        match self {
            LogicalPlanNode::Scan { exact_row_count, .. } => *exact_row_count,
            LogicalPlanNode::Filter {
                child,
                estimated_selectivity,
                ..
            } => ((child.estimated_row_count() as f64) * estimated_selectivity).round() as u64,
            LogicalPlanNode::Project { child, .. } => child.estimated_row_count(),
            LogicalPlanNode::Aggregate { .. } => 1,
            LogicalPlanNode::GroupBy { child, .. } => child.estimated_row_count(),
            LogicalPlanNode::Limit { child, count } => (*count).min(child.estimated_row_count()),
            LogicalPlanNode::Offset { child, count } => child.estimated_row_count().saturating_sub(*count),
            LogicalPlanNode::Sort { child, .. } => child.estimated_row_count(),
            LogicalPlanNode::Distinct { child } => child.estimated_row_count(),
        }
    }
}

//! Translator: lowers a surface query AST into a [`LogicalPlanNode`] tree.
//! The AST variant set and lowering contract come straight from the
//! design notes' "expression trees → AST enum" redesign: the translator is
//! a total function over a closed AST, not a walk over a reflective
//! expression tree the way the LINQ-style source pattern works.

mod canonical;

pub use canonical::canonical_key;

use std::sync::Arc;

use crate::bitmap::SelectionBitmap;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::plan::{AggregateOp, GroupAggregation, LogicalPlanNode, Projection, SortDirection, SortKey};
use crate::predicate::{
    AndPredicate, BoolTest, BooleanPredicate, ColumnPredicate, CompareOp, IsNotNullPredicate, IsNullPredicate,
    NotPredicate, NumericComparisonPredicate, NumericConstant, OrPredicate, RangePredicate,
    StringContainsPredicate, StringEndsWithPredicate, StringEqualityPredicate, StringStartsWithPredicate,
};
use crate::schema::{Schema, SchemaRef};

/// A surface-level scalar constant. Cache-key canonicalization abstracts
/// every variant to `?`.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    Bool(bool),
}

impl Constant {
    fn as_numeric(&self) -> Option<NumericConstant> {
        match self {
            Constant::I64(v) => Some(NumericConstant::I64(*v)),
            Constant::U64(v) => Some(NumericConstant::U64(*v)),
            Constant::F64(v) => Some(NumericConstant::F64(*v)),
            _ => None,
        }
    }
}

/// A `Where(predicate)` expression tree, walked into `ColumnPredicate`s (or
/// marked unsupported) by [`lower_filter`].
#[derive(Debug, Clone)]
pub enum SurfaceExpr {
    Compare { column: String, op: CompareOp, value: Constant },
    Range { column: String, lo: Constant, hi: Constant, lo_inclusive: bool, hi_inclusive: bool },
    IsNull(String),
    IsNotNull(String),
    StringEq { column: String, value: String },
    StringStartsWith { column: String, value: String },
    StringEndsWith { column: String, value: String },
    StringContains { column: String, value: String },
    BoolTest { column: String, test: BoolTest },
    And(Vec<SurfaceExpr>),
    Or(Vec<SurfaceExpr>),
    Not(Box<SurfaceExpr>),
    /// A construct the translator does not recognize (an unrecognized
    /// method call, in the LINQ-style reference surface). Carries a short
    /// description for diagnostics only.
    Unsupported(String),
}

/// A `Select(shape)` projection shape.
#[derive(Debug, Clone)]
pub enum ProjectionShape {
    Identity,
    SingleColumn(String),
    Struct(Vec<ShapeMember>),
}

#[derive(Debug, Clone)]
pub enum ShapeMember {
    Column { source: String, output_name: String },
    Computed { output_name: String, output_type: crate::schema::LogicalType },
}

#[derive(Debug, Clone)]
pub enum GroupShapeMember {
    Key { output_name: String },
    Count { output_name: String },
    Sum { column: String, output_name: String },
    Average { column: String, output_name: String },
    Min { column: String, output_name: String },
    Max { column: String, output_name: String },
}

#[derive(Debug, Clone)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone)]
pub enum SurfaceOp {
    Filter(SurfaceExpr),
    Project(ProjectionShape),
    GroupBy { key_column: String, shape: Vec<GroupShapeMember> },
    Limit(u64),
    Offset(u64),
    Sort(Vec<SortSpec>),
    Distinct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOp {
    Count,
    Any,
    First,
    Sum(String),
    Average(String),
    Min(String),
    Max(String),
    ToList,
    ToArray,
}

#[derive(Debug, Clone)]
pub struct SurfaceQuery {
    pub table_name: String,
    pub ops: Vec<SurfaceOp>,
    pub terminal: TerminalOp,
}

/// The lowered form handed to the optimizer: a logical plan plus the
/// terminal operation, which for `Any`/`First`/`ToList`/`ToArray` has no
/// logical-plan representation of its own and is interpreted directly by
/// the executor against the plan's `QueryResult`.
pub struct TranslatedQuery {
    pub plan: Arc<LogicalPlanNode>,
    pub terminal: TerminalOp,
}

pub fn translate(query: &SurfaceQuery, schema: SchemaRef, row_count: u64, config: &EngineConfig) -> Result<TranslatedQuery> {
    let mut plan: Arc<LogicalPlanNode> = Arc::new(LogicalPlanNode::scan(&query.table_name, schema, row_count));

    for op in &query.ops {
        plan = match op {
            SurfaceOp::Filter(expr) => lower_filter(plan, expr, config)?,
            SurfaceOp::Project(shape) => {
                let current_schema = plan.output_schema();
                let projections = lower_projection(shape, &current_schema)?;
                Arc::new(LogicalPlanNode::project(plan, projections)?)
            }
            SurfaceOp::GroupBy { key_column, shape } => {
                let current_schema = plan.output_schema();
                lower_group_by(plan, key_column, shape, &current_schema)?
            }
            SurfaceOp::Limit(n) => Arc::new(LogicalPlanNode::limit(plan, *n)),
            SurfaceOp::Offset(n) => Arc::new(LogicalPlanNode::offset(plan, *n)),
            SurfaceOp::Sort(specs) => {
                let current_schema = plan.output_schema();
                let orderings = specs
                    .iter()
                    .map(|s| {
                        current_schema.require_column(&s.column).map(|column| SortKey {
                            column,
                            direction: s.direction,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(LogicalPlanNode::sort(plan, orderings)?)
            }
            SurfaceOp::Distinct => Arc::new(LogicalPlanNode::distinct(plan)),
        };
    }

    plan = apply_terminal_aggregate(plan, &query.terminal)?;

    Ok(TranslatedQuery {
        plan,
        terminal: query.terminal.clone(),
    })
}

/// `Sum`/`Average`/`Min`/`Max`/`Count` are represented as a top-level
/// `Aggregate` node so the optimizer's fused-operator-marking rule sees it
/// sitting directly above a Filter. `Any`/`First`/`ToList`/`ToArray` leave
/// the plan untouched.
fn apply_terminal_aggregate(plan: Arc<LogicalPlanNode>, terminal: &TerminalOp) -> Result<Arc<LogicalPlanNode>> {
    let schema = plan.output_schema();
    let (op, column_name) = match terminal {
        TerminalOp::Count => (AggregateOp::Count, None),
        TerminalOp::Sum(c) => (AggregateOp::Sum, Some(c)),
        TerminalOp::Average(c) => (AggregateOp::Avg, Some(c)),
        TerminalOp::Min(c) => (AggregateOp::Min, Some(c)),
        TerminalOp::Max(c) => (AggregateOp::Max, Some(c)),
        TerminalOp::Any | TerminalOp::First | TerminalOp::ToList | TerminalOp::ToArray => return Ok(plan),
    };
    let column = column_name.map(|name| schema.require_column(name)).transpose()?;
    let output_type = match (op, column) {
        (AggregateOp::Count, _) => crate::schema::LogicalType::I64,
        (AggregateOp::Avg, _) => crate::schema::LogicalType::F64,
        (_, Some(idx)) => schema.columns()[idx].logical_type,
        _ => unreachable!("non-Count aggregate always has a column"),
    };
    Ok(Arc::new(LogicalPlanNode::aggregate(plan, op, column, output_type)?))
}

fn lower_filter(child: Arc<LogicalPlanNode>, expr: &SurfaceExpr, config: &EngineConfig) -> Result<Arc<LogicalPlanNode>> {
    let schema = child.output_schema();
    match lower_top_level(expr, &schema)? {
        Some(predicates) => {
            let selectivity = predicates.iter().map(|p| p.estimated_selectivity()).product();
            Ok(Arc::new(LogicalPlanNode::filter(child, predicates, selectivity)?))
        }
        None => {
            if config.strict_predicate {
                Err(EngineError::UnsupportedOperation(format!(
                    "Where clause contains an expression the engine cannot lower: {expr:?}"
                )))
            } else {
                // Whole-Filter-granularity fallback: never a single
                // predicate within a multi-predicate filter.
                Ok(Arc::new(LogicalPlanNode::filter_fallback(child)))
            }
        }
    }
}

/// A conjunction at the top of a `Where` lowers to a flat predicate list
/// (so the optimizer can reorder them independently); anything else
/// lowers to a single predicate (which may itself be a compound OR/NOT).
fn lower_top_level(expr: &SurfaceExpr, schema: &Schema) -> Result<Option<Vec<Arc<dyn ColumnPredicate>>>> {
    match expr {
        SurfaceExpr::And(children) => {
            let mut predicates = Vec::with_capacity(children.len());
            for child in children {
                match lower_single(child, schema)? {
                    Some(p) => predicates.push(p),
                    None => return Ok(None),
                }
            }
            Ok(Some(predicates))
        }
        other => Ok(lower_single(other, schema)?.map(|p| vec![p])),
    }
}

fn lower_single(expr: &SurfaceExpr, schema: &Schema) -> Result<Option<Arc<dyn ColumnPredicate>>> {
    match expr {
        SurfaceExpr::Compare { column, op, value } => {
            let idx = schema.require_column(column)?;
            let logical_type = schema.columns()[idx].logical_type;
            let Some(constant) = value.as_numeric() else {
                return Err(EngineError::PredicateTypeMismatch(format!(
                    "comparison against `{column}` requires a numeric constant"
                )));
            };
            Ok(Some(Arc::new(NumericComparisonPredicate::try_new(
                idx,
                logical_type,
                *op,
                constant,
            )?)))
        }
        SurfaceExpr::Range { column, lo, hi, lo_inclusive, hi_inclusive } => {
            let idx = schema.require_column(column)?;
            let logical_type = schema.columns()[idx].logical_type;
            let (Some(lo), Some(hi)) = (lo.as_numeric(), hi.as_numeric()) else {
                return Err(EngineError::PredicateTypeMismatch(format!(
                    "range predicate against `{column}` requires numeric bounds"
                )));
            };
            Ok(Some(Arc::new(RangePredicate::try_new(
                idx,
                logical_type,
                lo,
                hi,
                *lo_inclusive,
                *hi_inclusive,
            )?)))
        }
        SurfaceExpr::IsNull(column) => {
            let idx = schema.require_column(column)?;
            Ok(Some(Arc::new(IsNullPredicate::new(idx))))
        }
        SurfaceExpr::IsNotNull(column) => {
            let idx = schema.require_column(column)?;
            Ok(Some(Arc::new(IsNotNullPredicate::new(idx))))
        }
        SurfaceExpr::StringEq { column, value } => {
            let idx = schema.require_column(column)?;
            let logical_type = schema.columns()[idx].logical_type;
            Ok(Some(Arc::new(StringEqualityPredicate::try_new(idx, logical_type, value.clone())?)))
        }
        SurfaceExpr::StringStartsWith { column, value } => {
            let idx = schema.require_column(column)?;
            let logical_type = schema.columns()[idx].logical_type;
            Ok(Some(Arc::new(StringStartsWithPredicate::try_new(idx, logical_type, value.clone())?)))
        }
        SurfaceExpr::StringEndsWith { column, value } => {
            let idx = schema.require_column(column)?;
            let logical_type = schema.columns()[idx].logical_type;
            Ok(Some(Arc::new(StringEndsWithPredicate::try_new(idx, logical_type, value.clone())?)))
        }
        SurfaceExpr::StringContains { column, value } => {
            let idx = schema.require_column(column)?;
            let logical_type = schema.columns()[idx].logical_type;
            Ok(Some(Arc::new(StringContainsPredicate::try_new(idx, logical_type, value.clone())?)))
        }
        SurfaceExpr::BoolTest { column, test } => {
            let idx = schema.require_column(column)?;
            Ok(Some(Arc::new(BooleanPredicate::new(idx, *test))))
        }
        SurfaceExpr::And(children) => {
            let mut predicates = Vec::with_capacity(children.len());
            for child in children {
                match lower_single(child, schema)? {
                    Some(p) => predicates.push(p),
                    None => return Ok(None),
                }
            }
            Ok(Some(Arc::new(AndPredicate::new(predicates))))
        }
        SurfaceExpr::Or(children) => {
            let mut predicates = Vec::with_capacity(children.len());
            for child in children {
                match lower_single(child, schema)? {
                    Some(p) => predicates.push(p),
                    None => return Ok(None),
                }
            }
            Ok(Some(Arc::new(OrPredicate::new(predicates))))
        }
        SurfaceExpr::Not(inner) => match lower_single(inner, schema)? {
            Some(p) => Ok(Some(Arc::new(NotPredicate::new(p)))),
            None => Ok(None),
        },
        SurfaceExpr::Unsupported(_) => Ok(None),
    }
}

fn lower_projection(shape: &ProjectionShape, schema: &Schema) -> Result<Vec<Projection>> {
    match shape {
        ProjectionShape::Identity => Ok(schema
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| Projection::Column {
                source: i,
                output_name: c.name.clone(),
            })
            .collect()),
        ProjectionShape::SingleColumn(name) => {
            let idx = schema.require_column(name)?;
            Ok(vec![Projection::Column {
                source: idx,
                output_name: name.clone(),
            }])
        }
        ProjectionShape::Struct(members) => members
            .iter()
            .map(|m| match m {
                ShapeMember::Column { source, output_name } => {
                    let idx = schema.require_column(source)?;
                    Ok(Projection::Column {
                        source: idx,
                        output_name: output_name.clone(),
                    })
                }
                ShapeMember::Computed { output_name, output_type } => Ok(Projection::Computed {
                    output_name: output_name.clone(),
                    output_type: *output_type,
                }),
            })
            .collect(),
    }
}

fn lower_group_by(
    child: Arc<LogicalPlanNode>,
    key_column: &str,
    shape: &[GroupShapeMember],
    schema: &Schema,
) -> Result<Arc<LogicalPlanNode>> {
    let group_column = schema.require_column(key_column)?;
    let key_type = schema.columns()[group_column].logical_type;
    let aggregations = shape
        .iter()
        .map(|m| -> Result<GroupAggregation> {
            Ok(match m {
                GroupShapeMember::Key { .. } => GroupAggregation::Key,
                GroupShapeMember::Count { output_name } => GroupAggregation::Count {
                    output_name: output_name.clone(),
                },
                GroupShapeMember::Sum { column, output_name } => GroupAggregation::Sum {
                    column: schema.require_column(column)?,
                    output_name: output_name.clone(),
                },
                GroupShapeMember::Average { column, output_name } => GroupAggregation::Avg {
                    column: schema.require_column(column)?,
                    output_name: output_name.clone(),
                },
                GroupShapeMember::Min { column, output_name } => GroupAggregation::Min {
                    column: schema.require_column(column)?,
                    output_name: output_name.clone(),
                },
                GroupShapeMember::Max { column, output_name } => GroupAggregation::Max {
                    column: schema.require_column(column)?,
                    output_name: output_name.clone(),
                },
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(LogicalPlanNode::group_by(child, group_column, key_type, aggregations)?))
}

/// The whole-row selection a bitmap-only `QueryResult` represents, used by
/// `Any`/`First` terminal evaluation without requiring a materialized row.
pub fn first_selected_index(bitmap: &SelectionBitmap) -> Option<u64> {
    bitmap.get_selected_indices().into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, Encoding, LogicalType};

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            ColumnDef {
                name: "age".into(),
                logical_type: LogicalType::I32,
                nullable: false,
                encoding: Encoding::Plain,
            },
            ColumnDef {
                name: "name".into(),
                logical_type: LogicalType::Utf8,
                nullable: false,
                encoding: Encoding::Plain,
            },
        ]))
    }

    #[test]
    fn filter_count_lowers_to_filter_then_aggregate() {
        let query = SurfaceQuery {
            table_name: "t".into(),
            ops: vec![SurfaceOp::Filter(SurfaceExpr::Compare {
                column: "age".into(),
                op: CompareOp::Gt,
                value: Constant::I64(50),
            })],
            terminal: TerminalOp::Count,
        };
        let translated = translate(&query, schema(), 10_000, &EngineConfig::default()).unwrap();
        match translated.plan.as_ref() {
            LogicalPlanNode::Aggregate { child, op, column, .. } => {
                assert_eq!(*op, AggregateOp::Count);
                assert_eq!(*column, None);
                assert!(matches!(child.as_ref(), LogicalPlanNode::Filter { .. }));
            }
            other => panic!("expected Aggregate, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_expression_fails_strict_and_falls_back_otherwise() {
        let query = SurfaceQuery {
            table_name: "t".into(),
            ops: vec![SurfaceOp::Filter(SurfaceExpr::Unsupported("custom method call".into()))],
            terminal: TerminalOp::ToList,
        };
        let strict = EngineConfig::default();
        assert!(translate(&query, schema(), 10, &strict).is_err());

        let lenient = EngineConfig::default().with_strict_predicate(false);
        let translated = translate(&query, schema(), 10, &lenient).unwrap();
        assert!(matches!(translated.plan.as_ref(), LogicalPlanNode::Filter { fallback: true, .. }));
    }

    #[test]
    fn group_by_lowers_key_and_aggregates() {
        let query = SurfaceQuery {
            table_name: "t".into(),
            ops: vec![SurfaceOp::GroupBy {
                key_column: "age".into(),
                shape: vec![
                    GroupShapeMember::Key { output_name: "key".into() },
                    GroupShapeMember::Count { output_name: "count".into() },
                ],
            }],
            terminal: TerminalOp::ToList,
        };
        let translated = translate(&query, schema(), 1000, &EngineConfig::default()).unwrap();
        assert!(matches!(translated.plan.as_ref(), LogicalPlanNode::GroupBy { .. }));
    }
}

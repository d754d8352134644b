//! Optimizer: a list of pure rules run by a fixed-point driver, mirroring
//! `datafusion-optimizer`'s `OptimizerRule` trait and
//! `optimizer/src/utils.rs::optimize_children` rather than one monolithic
//! rewrite function. Every rule is pure — no hidden state, no dependence on
//! invocation order beyond the list order given to `Optimizer::new`.

use std::sync::Arc;

use log::{debug, trace};

use super::{LogicalPlanNode, Projection, TreeNode};
use crate::error::Result;
use crate::predicate::ColumnPredicate;
use crate::zonemap::SnapshotZoneMaps;

use super::selectivity::order_by_selectivity;

/// Per-optimization-pass context available to every rule; currently just
/// the zone maps used for selectivity estimation. Threaded explicitly
/// rather than captured, so rules stay pure functions of (plan, context).
pub struct OptimizerContext<'a> {
    pub zone_maps: Option<&'a SnapshotZoneMaps>,
}

pub trait OptimizerRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rewrites `plan`, returning the same `Arc` (by pointer) when this
    /// rule makes no change — the driver's fixed-point check depends on
    /// this contract holding exactly, not approximately.
    fn apply(&self, plan: Arc<LogicalPlanNode>, ctx: &OptimizerContext<'_>) -> Result<Arc<LogicalPlanNode>>;

    /// Most rules converge in one pass; a rule may override this to cap
    /// its own iteration count independently of the overall driver cap.
    fn max_iterations(&self) -> usize {
        1
    }
}

/// Reorders predicates within each `Filter` by ascending selectivity
/// score, most restrictive first. Ties broken by bound column index inside
/// `order_by_selectivity` for determinism.
pub struct ReorderPredicatesRule;

impl OptimizerRule for ReorderPredicatesRule {
    fn name(&self) -> &'static str {
        "reorder_predicates"
    }

    fn apply(&self, plan: Arc<LogicalPlanNode>, ctx: &OptimizerContext<'_>) -> Result<Arc<LogicalPlanNode>> {
        plan.transform(&mut |node| {
            let LogicalPlanNode::Filter {
                child,
                predicates,
                estimated_selectivity,
                fused_with_parent_aggregate,
                fallback,
            } = node.as_ref()
            else {
                return Ok(node);
            };
            if fallback_or_single(*fallback, predicates) {
                return Ok(node);
            }
            let order = order_by_selectivity(predicates, ctx.zone_maps);
            if order.iter().enumerate().all(|(i, &j)| i == j) {
                return Ok(node);
            }
            let reordered: Vec<Arc<dyn ColumnPredicate>> = order.iter().map(|&i| predicates[i].clone()).collect();
            trace!("reorder_predicates: reordered {} predicates", reordered.len());
            Ok(Arc::new(LogicalPlanNode::Filter {
                child: child.clone(),
                predicates: reordered,
                estimated_selectivity: *estimated_selectivity,
                fused_with_parent_aggregate: *fused_with_parent_aggregate,
                fallback: *fallback,
            }))
        })
    }
}

fn fallback_or_single(fallback: bool, predicates: &[Arc<dyn ColumnPredicate>]) -> bool {
    fallback || predicates.len() <= 1
}

/// A `Filter` whose child is a `Scan` is retained as-is; the row range it
/// covers is already exactly the scan's `exact_row_count`, so there is no
/// separate field to annotate — this rule exists as a structural no-op
/// that documents the merge point the physical planner looks for.
pub struct FilterIntoScanRule;

impl OptimizerRule for FilterIntoScanRule {
    fn name(&self) -> &'static str {
        "filter_into_scan"
    }

    fn apply(&self, plan: Arc<LogicalPlanNode>, _ctx: &OptimizerContext<'_>) -> Result<Arc<LogicalPlanNode>> {
        Ok(plan)
    }
}

/// Pushes a `Filter` through a `Project` when every column the filter's
/// predicates reference survives the projection unrenamed-in-position
/// (i.e. each referenced source index has a `Projection::Column` at some
/// output position, and the filter is rewritten against the *child's*
/// column indices, then re-wrapped by the same Project).
pub struct PushFilterThroughProjectRule;

impl OptimizerRule for PushFilterThroughProjectRule {
    fn name(&self) -> &'static str {
        "push_filter_through_project"
    }

    fn apply(&self, plan: Arc<LogicalPlanNode>, _ctx: &OptimizerContext<'_>) -> Result<Arc<LogicalPlanNode>> {
        plan.transform(&mut |node| {
            let LogicalPlanNode::Filter {
                child,
                predicates,
                estimated_selectivity,
                fused_with_parent_aggregate,
                fallback,
            } = node.as_ref()
            else {
                return Ok(node);
            };
            let LogicalPlanNode::Project {
                child: project_child,
                projections,
            } = child.as_ref()
            else {
                return Ok(node);
            };
            if *fallback {
                return Ok(node);
            }
            // Map each output column index back to its source index; only
            // straight column projections are traceable.
            let mut source_of = Vec::with_capacity(projections.len());
            for p in projections {
                match p {
                    Projection::Column { source, .. } => source_of.push(Some(*source)),
                    Projection::Computed { .. } => source_of.push(None),
                }
            }
            // Compound predicates (AND/OR/NOT) report no single bound
            // column, so their children's references can't be checked
            // against `source_of` here; conservatively refuse to push
            // those through rather than risk remapping a computed-column
            // reference that has no source index at all.
            let all_traceable = predicates.iter().all(|p| match p.column_index() {
                None => false,
                Some(out_idx) => source_of.get(out_idx).map_or(false, |s| s.is_some()),
            });
            if !all_traceable {
                return Ok(node);
            }
            debug!("push_filter_through_project: pushing {} predicates below project", predicates.len());
            let remapped: Vec<Arc<dyn ColumnPredicate>> = predicates
                .iter()
                .map(|p| p.remap_columns(&|out_idx| source_of[out_idx].unwrap()))
                .collect();
            let pushed_filter = Arc::new(LogicalPlanNode::Filter {
                child: project_child.clone(),
                predicates: remapped,
                estimated_selectivity: *estimated_selectivity,
                fused_with_parent_aggregate: *fused_with_parent_aggregate,
                fallback: *fallback,
            });
            Ok(Arc::new(LogicalPlanNode::Project {
                child: pushed_filter,
                projections: projections.clone(),
            }))
        })
    }
}

/// Marks a `Filter` whose parent is an `Aggregate` so the physical planner
/// can choose the fused filter+aggregate kernel instead of materializing
/// an intermediate bitmap. Purely a tag; the logical semantics are
/// unchanged.
pub struct MarkFusedAggregateRule;

impl OptimizerRule for MarkFusedAggregateRule {
    fn name(&self) -> &'static str {
        "mark_fused_aggregate"
    }

    fn apply(&self, plan: Arc<LogicalPlanNode>, _ctx: &OptimizerContext<'_>) -> Result<Arc<LogicalPlanNode>> {
        plan.transform(&mut |node| {
            let LogicalPlanNode::Aggregate {
                child,
                op,
                column,
                output_type,
            } = node.as_ref()
            else {
                return Ok(node);
            };
            let LogicalPlanNode::Filter {
                child: filter_child,
                predicates,
                estimated_selectivity,
                fused_with_parent_aggregate,
                fallback,
            } = child.as_ref()
            else {
                return Ok(node);
            };
            if *fused_with_parent_aggregate || *fallback {
                return Ok(node);
            }
            let marked_filter = Arc::new(LogicalPlanNode::Filter {
                child: filter_child.clone(),
                predicates: predicates.clone(),
                estimated_selectivity: *estimated_selectivity,
                fused_with_parent_aggregate: true,
                fallback: *fallback,
            });
            Ok(Arc::new(LogicalPlanNode::Aggregate {
                child: marked_filter,
                op: *op,
                column: *column,
                output_type: *output_type,
            }))
        })
    }
}

/// Pushes `Limit` through `Project` and `Filter` only when no `Sort` sits
/// between the limit and the node it crosses — crossing a `Sort` would
/// change which rows are retained.
pub struct PushLimitRule;

impl OptimizerRule for PushLimitRule {
    fn name(&self) -> &'static str {
        "push_limit"
    }

    fn apply(&self, plan: Arc<LogicalPlanNode>, _ctx: &OptimizerContext<'_>) -> Result<Arc<LogicalPlanNode>> {
        plan.transform(&mut |node| {
            let LogicalPlanNode::Limit { child, count } = node.as_ref() else {
                return Ok(node);
            };
            match child.as_ref() {
                LogicalPlanNode::Project { child: inner, projections } => {
                    let pushed = Arc::new(LogicalPlanNode::Limit {
                        child: inner.clone(),
                        count: *count,
                    });
                    Ok(Arc::new(LogicalPlanNode::Project {
                        child: pushed,
                        projections: projections.clone(),
                    }))
                }
                LogicalPlanNode::Filter {
                    child: inner,
                    predicates,
                    estimated_selectivity,
                    fused_with_parent_aggregate,
                    fallback,
                } => {
                    let pushed = Arc::new(LogicalPlanNode::Limit {
                        child: inner.clone(),
                        count: *count,
                    });
                    Ok(Arc::new(LogicalPlanNode::Filter {
                        child: pushed,
                        predicates: predicates.clone(),
                        estimated_selectivity: *estimated_selectivity,
                        fused_with_parent_aggregate: *fused_with_parent_aggregate,
                        fallback: *fallback,
                    }))
                }
                _ => Ok(node),
            }
        })
    }
}

/// Fixed-point driver over an ordered list of rules. Applies every rule in
/// order per pass; stops when a full pass makes no change (detected via
/// `Arc::ptr_eq` at each rule application) or `max_passes` is reached.
pub struct Optimizer {
    rules: Vec<Box<dyn OptimizerRule>>,
    max_passes: usize,
}

impl Optimizer {
    pub fn new(rules: Vec<Box<dyn OptimizerRule>>, max_passes: usize) -> Self {
        Self { rules, max_passes }
    }

    /// The standard rule set, applied in an order chosen so each rule sees
    /// the plan shape the next one expects (projections pushed through
    /// before predicates are reordered, fused-aggregate marking after
    /// reordering settles, limit pushdown last).
    pub fn standard() -> Self {
        Self::new(
            vec![
                Box::new(FilterIntoScanRule),
                Box::new(PushFilterThroughProjectRule),
                Box::new(ReorderPredicatesRule),
                Box::new(MarkFusedAggregateRule),
                Box::new(PushLimitRule),
            ],
            16,
        )
    }

    pub fn optimize(&self, plan: Arc<LogicalPlanNode>, ctx: &OptimizerContext<'_>) -> Result<Arc<LogicalPlanNode>> {
        let mut current = plan;
        for pass in 0..self.max_passes {
            let mut changed = false;
            for rule in &self.rules {
                let next = rule.apply(current.clone(), ctx)?;
                if !Arc::ptr_eq(&next, &current) {
                    debug!("optimizer pass {pass}: rule `{}` changed the plan", rule.name());
                    changed = true;
                }
                current = next;
            }
            if !changed {
                break;
            }
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{CompareOp, NumericComparisonPredicate, NumericConstant};
    use crate::schema::{ColumnDef, Encoding, LogicalType, Schema, SchemaRef};

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            ColumnDef {
                name: "age".into(),
                logical_type: LogicalType::I32,
                nullable: false,
                encoding: Encoding::Plain,
            },
            ColumnDef {
                name: "score".into(),
                logical_type: LogicalType::I32,
                nullable: false,
                encoding: Encoding::Plain,
            },
        ]))
    }

    fn eq(col: usize, v: i64) -> Arc<dyn ColumnPredicate> {
        Arc::new(NumericComparisonPredicate::try_new(col, LogicalType::I32, CompareOp::Eq, NumericConstant::I64(v)).unwrap())
    }

    fn gt(col: usize, v: i64) -> Arc<dyn ColumnPredicate> {
        Arc::new(NumericComparisonPredicate::try_new(col, LogicalType::I32, CompareOp::Gt, NumericConstant::I64(v)).unwrap())
    }

    #[test]
    fn optimizer_is_idempotent() {
        let scan = Arc::new(LogicalPlanNode::scan("t", schema(), 1000));
        let filter = Arc::new(LogicalPlanNode::filter(scan, vec![gt(0, 5), eq(1, 1)], 0.3).unwrap());
        let optimizer = Optimizer::standard();
        let ctx = OptimizerContext { zone_maps: None };
        let once = optimizer.optimize(filter, &ctx).unwrap();
        let twice = optimizer.optimize(once.clone(), &ctx).unwrap();
        assert!(Arc::ptr_eq(&once, &twice));
    }

    #[test]
    fn reorder_puts_equality_before_inequality() {
        let scan = Arc::new(LogicalPlanNode::scan("t", schema(), 1000));
        let filter = Arc::new(LogicalPlanNode::filter(scan, vec![gt(0, 5), eq(1, 1)], 0.3).unwrap());
        let optimizer = Optimizer::new(vec![Box::new(ReorderPredicatesRule)], 4);
        let ctx = OptimizerContext { zone_maps: None };
        let optimized = optimizer.optimize(filter, &ctx).unwrap();
        let LogicalPlanNode::Filter { predicates, .. } = optimized.as_ref() else {
            panic!("expected filter");
        };
        assert_eq!(predicates[0].column_index(), Some(1));
    }

    #[test]
    fn fused_marking_tags_filter_under_aggregate() {
        let scan = Arc::new(LogicalPlanNode::scan("t", schema(), 1000));
        let filter = Arc::new(LogicalPlanNode::filter(scan, vec![gt(0, 5)], 0.3).unwrap());
        let agg =
            Arc::new(LogicalPlanNode::aggregate(filter, super::super::AggregateOp::Sum, Some(1), LogicalType::I64).unwrap());
        let optimizer = Optimizer::new(vec![Box::new(MarkFusedAggregateRule)], 4);
        let ctx = OptimizerContext { zone_maps: None };
        let optimized = optimizer.optimize(agg, &ctx).unwrap();
        let LogicalPlanNode::Aggregate { child, .. } = optimized.as_ref() else {
            panic!("expected aggregate");
        };
        let LogicalPlanNode::Filter { fused_with_parent_aggregate, .. } = child.as_ref() else {
            panic!("expected filter");
        };
        assert!(fused_with_parent_aggregate);
    }
}

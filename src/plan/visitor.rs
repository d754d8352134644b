//! `TreeNode`-style dual visitor: `transform` rewrites a plan into a plan,
//! `reduce` folds a plan into a value. Grounded on `datafusion-expr`'s
//! `tree_node/plan.rs` pattern — the same dual interface, scaled down to
//! this crate's nine node kinds.
//!
//! `transform` returns a reference-equal (`Arc::ptr_eq`) node when a
//! rewrite changes nothing; the optimizer's fixed-point driver relies on
//! that to detect convergence without a separate dirty flag.

use std::sync::Arc;

use super::LogicalPlanNode;
use crate::error::Result;

pub trait TreeNode {
    /// Rewrites this node's children first, then applies `f` to the
    /// resulting node. `f` receives an already-child-rewritten node and
    /// returns the node unchanged (same `Arc`) when no rewrite applies.
    fn transform(self: Arc<Self>, f: &mut dyn FnMut(Arc<LogicalPlanNode>) -> Result<Arc<LogicalPlanNode>>) -> Result<Arc<LogicalPlanNode>>;

    /// Folds every node in the tree, post-order, into an accumulator.
    fn reduce<A>(self: &Arc<Self>, init: A, f: &mut dyn FnMut(A, &LogicalPlanNode) -> A) -> A;
}

impl TreeNode for LogicalPlanNode {
    fn transform(
        self: Arc<Self>,
        f: &mut dyn FnMut(Arc<LogicalPlanNode>) -> Result<Arc<LogicalPlanNode>>,
    ) -> Result<Arc<LogicalPlanNode>> {
        let rewritten_child = match self.child() {
            None => None,
            Some(child) => Some(Arc::clone(child).transform(f)?),
        };

        let with_new_child: Arc<LogicalPlanNode> = match (&*self, rewritten_child) {
            (LogicalPlanNode::Scan { .. }, _) => self.clone(),
            (_, Some(new_child)) if !Arc::ptr_eq(&new_child, self.child().unwrap()) => {
                Arc::new(with_child(&self, new_child))
            }
            _ => self.clone(),
        };

        f(with_new_child)
    }

    fn reduce<A>(self: &Arc<Self>, init: A, f: &mut dyn FnMut(A, &LogicalPlanNode) -> A) -> A {
        let acc = match self.child() {
            Some(child) => child.reduce(init, f),
            None => init,
        };
        f(acc, self)
    }
}

/// Rebuilds `node` with `new_child` substituted for its current child.
/// Every field besides the child is carried over unchanged.
fn with_child(node: &LogicalPlanNode, new_child: Arc<LogicalPlanNode>) -> LogicalPlanNode {
    match node {
        LogicalPlanNode::Scan { .. } => node.clone(),
        LogicalPlanNode::Filter {
            predicates,
            estimated_selectivity,
            fused_with_parent_aggregate,
            fallback,
            ..
        } => LogicalPlanNode::Filter {
            child: new_child,
            predicates: predicates.clone(),
            estimated_selectivity: *estimated_selectivity,
            fused_with_parent_aggregate: *fused_with_parent_aggregate,
            fallback: *fallback,
        },
        LogicalPlanNode::Project { projections, .. } => LogicalPlanNode::Project {
            child: new_child,
            projections: projections.clone(),
        },
        LogicalPlanNode::Aggregate { op, column, output_type, .. } => LogicalPlanNode::Aggregate {
            child: new_child,
            op: *op,
            column: *column,
            output_type: *output_type,
        },
        LogicalPlanNode::GroupBy {
            group_column,
            key_type,
            aggregations,
            ..
        } => LogicalPlanNode::GroupBy {
            child: new_child,
            group_column: *group_column,
            key_type: *key_type,
            aggregations: aggregations.clone(),
        },
        LogicalPlanNode::Limit { count, .. } => LogicalPlanNode::Limit {
            child: new_child,
            count: *count,
        },
        LogicalPlanNode::Offset { count, .. } => LogicalPlanNode::Offset {
            child: new_child,
            count: *count,
        },
        LogicalPlanNode::Sort { orderings, .. } => LogicalPlanNode::Sort {
            child: new_child,
            orderings: orderings.clone(),
        },
        LogicalPlanNode::Distinct { .. } => LogicalPlanNode::Distinct { child: new_child },
    }
}

//! Indented plan pretty-printer, the debug surface `datafusion`'s
//! `LogicalPlan::display_indent` and `aaneja-disagg_optimizer`'s
//! `planprinter.rs` both provide over an immutable plan tree.

use std::fmt::Write as _;

use super::{GroupAggregation, LogicalPlanNode, Projection};

pub fn display_indent(node: &LogicalPlanNode) -> String {
    let mut out = String::new();
    write_node(node, 0, &mut out);
    out
}

fn write_node(node: &LogicalPlanNode, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    match node {
        LogicalPlanNode::Scan {
            table_name,
            exact_row_count,
            ..
        } => {
            let _ = writeln!(out, "{pad}Scan: {table_name} (rows={exact_row_count})");
        }
        LogicalPlanNode::Filter {
            child,
            predicates,
            estimated_selectivity,
            fused_with_parent_aggregate,
            fallback,
        } => {
            let _ = writeln!(
                out,
                "{pad}Filter: predicates={} selectivity={estimated_selectivity:.3} fused={fused_with_parent_aggregate} fallback={fallback}",
                predicates.len()
            );
            write_node(child, depth + 1, out);
        }
        LogicalPlanNode::Project { child, projections } => {
            let names: Vec<&str> = projections
                .iter()
                .map(|p| match p {
                    Projection::Column { output_name, .. } => output_name.as_str(),
                    Projection::Computed { output_name, .. } => output_name.as_str(),
                })
                .collect();
            let _ = writeln!(out, "{pad}Project: [{}]", names.join(", "));
            write_node(child, depth + 1, out);
        }
        LogicalPlanNode::Aggregate { child, op, column, .. } => {
            let _ = writeln!(out, "{pad}Aggregate: {op:?}({column:?})");
            write_node(child, depth + 1, out);
        }
        LogicalPlanNode::GroupBy {
            child,
            group_column,
            aggregations,
            ..
        } => {
            let shape: Vec<String> = aggregations
                .iter()
                .map(|a| match a {
                    GroupAggregation::Key => "Key".to_string(),
                    GroupAggregation::Count { output_name } => format!("Count as {output_name}"),
                    GroupAggregation::Sum { column, output_name } => format!("Sum({column}) as {output_name}"),
                    GroupAggregation::Avg { column, output_name } => format!("Avg({column}) as {output_name}"),
                    GroupAggregation::Min { column, output_name } => format!("Min({column}) as {output_name}"),
                    GroupAggregation::Max { column, output_name } => format!("Max({column}) as {output_name}"),
                })
                .collect();
            let _ = writeln!(out, "{pad}GroupBy: key=col{group_column} shape=[{}]", shape.join(", "));
            write_node(child, depth + 1, out);
        }
        LogicalPlanNode::Limit { child, count } => {
            let _ = writeln!(out, "{pad}Limit: {count}");
            write_node(child, depth + 1, out);
        }
        LogicalPlanNode::Offset { child, count } => {
            let _ = writeln!(out, "{pad}Offset: {count}");
            write_node(child, depth + 1, out);
        }
        LogicalPlanNode::Sort { child, orderings } => {
            let _ = writeln!(out, "{pad}Sort: {orderings:?}");
            write_node(child, depth + 1, out);
        }
        LogicalPlanNode::Distinct { child } => {
            let _ = writeln!(out, "{pad}Distinct");
            write_node(child, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, Encoding, LogicalType, Schema};
    use std::sync::Arc;

    #[test]
    fn display_nests_by_depth() {
        let schema = Arc::new(Schema::new(vec![ColumnDef {
            name: "n".into(),
            logical_type: LogicalType::I32,
            nullable: false,
            encoding: Encoding::Plain,
        }]));
        let scan = Arc::new(LogicalPlanNode::scan("t", schema, 10));
        let limit = LogicalPlanNode::limit(scan, 5);
        let text = display_indent(&limit);
        assert!(text.starts_with("Limit: 5\n"));
        assert!(text.contains("  Scan: t"));
    }
}

//! Canonical cache-key form of a surface query: the same structure with
//! every constant abstracted to `?`, so two queries differing only in
//! literal values hash to the same plan-cache key.

use std::fmt::Write as _;

use super::{GroupShapeMember, ProjectionShape, ShapeMember, SurfaceExpr, SurfaceOp, SurfaceQuery, TerminalOp};

pub fn canonical_key(query: &SurfaceQuery) -> String {
    let mut out = String::new();
    let _ = write!(out, "Scan({})", query.table_name);
    for op in &query.ops {
        out.push('.');
        write_op(op, &mut out);
    }
    out.push('.');
    write_terminal(&query.terminal, &mut out);
    out
}

fn write_op(op: &SurfaceOp, out: &mut String) {
    match op {
        SurfaceOp::Filter(expr) => {
            out.push_str("Filter(");
            write_expr(expr, out);
            out.push(')');
        }
        SurfaceOp::Project(shape) => {
            out.push_str("Project(");
            write_shape(shape, out);
            out.push(')');
        }
        SurfaceOp::GroupBy { key_column, shape } => {
            let _ = write!(out, "GroupBy({key_column}, [");
            for (i, m) in shape.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_group_member(m, out);
            }
            out.push_str("])");
        }
        SurfaceOp::Limit(_) => out.push_str("Limit(?)"),
        SurfaceOp::Offset(_) => out.push_str("Offset(?)"),
        SurfaceOp::Sort(specs) => {
            out.push_str("Sort([");
            for (i, s) in specs.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}:{:?}", s.column, s.direction);
            }
            out.push_str("])");
        }
        SurfaceOp::Distinct => out.push_str("Distinct"),
    }
}

fn write_expr(expr: &SurfaceExpr, out: &mut String) {
    match expr {
        SurfaceExpr::Compare { column, op, .. } => {
            let _ = write!(out, "Cmp({column},{op:?},?)");
        }
        SurfaceExpr::Range { column, lo_inclusive, hi_inclusive, .. } => {
            let _ = write!(out, "Range({column},?,?,{lo_inclusive},{hi_inclusive})");
        }
        SurfaceExpr::IsNull(c) => {
            let _ = write!(out, "IsNull({c})");
        }
        SurfaceExpr::IsNotNull(c) => {
            let _ = write!(out, "IsNotNull({c})");
        }
        SurfaceExpr::StringEq { column, .. } => {
            let _ = write!(out, "StrEq({column},?)");
        }
        SurfaceExpr::StringStartsWith { column, .. } => {
            let _ = write!(out, "StrStartsWith({column},?)");
        }
        SurfaceExpr::StringEndsWith { column, .. } => {
            let _ = write!(out, "StrEndsWith({column},?)");
        }
        SurfaceExpr::StringContains { column, .. } => {
            let _ = write!(out, "StrContains({column},?)");
        }
        SurfaceExpr::BoolTest { column, test } => {
            let _ = write!(out, "BoolTest({column},{test:?})");
        }
        SurfaceExpr::And(children) => {
            out.push_str("And[");
            for (i, c) in children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_expr(c, out);
            }
            out.push(']');
        }
        SurfaceExpr::Or(children) => {
            out.push_str("Or[");
            for (i, c) in children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_expr(c, out);
            }
            out.push(']');
        }
        SurfaceExpr::Not(inner) => {
            out.push_str("Not(");
            write_expr(inner, out);
            out.push(')');
        }
        SurfaceExpr::Unsupported(desc) => {
            let _ = write!(out, "Unsupported({desc})");
        }
    }
}

fn write_shape(shape: &ProjectionShape, out: &mut String) {
    match shape {
        ProjectionShape::Identity => out.push_str("Identity"),
        ProjectionShape::SingleColumn(c) => {
            let _ = write!(out, "Single({c})");
        }
        ProjectionShape::Struct(members) => {
            out.push_str("Struct[");
            for (i, m) in members.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                match m {
                    ShapeMember::Column { source, output_name } => {
                        let _ = write!(out, "{output_name}={source}");
                    }
                    ShapeMember::Computed { output_name, .. } => {
                        let _ = write!(out, "{output_name}=<computed>");
                    }
                }
            }
            out.push(']');
        }
    }
}

fn write_group_member(member: &GroupShapeMember, out: &mut String) {
    match member {
        GroupShapeMember::Key { output_name } => {
            let _ = write!(out, "{output_name}=Key");
        }
        GroupShapeMember::Count { output_name } => {
            let _ = write!(out, "{output_name}=Count");
        }
        GroupShapeMember::Sum { column, output_name } => {
            let _ = write!(out, "{output_name}=Sum({column})");
        }
        GroupShapeMember::Average { column, output_name } => {
            let _ = write!(out, "{output_name}=Average({column})");
        }
        GroupShapeMember::Min { column, output_name } => {
            let _ = write!(out, "{output_name}=Min({column})");
        }
        GroupShapeMember::Max { column, output_name } => {
            let _ = write!(out, "{output_name}=Max({column})");
        }
    }
}

fn write_terminal(terminal: &TerminalOp, out: &mut String) {
    match terminal {
        TerminalOp::Count => out.push_str("Count"),
        TerminalOp::Any => out.push_str("Any"),
        TerminalOp::First => out.push_str("First"),
        TerminalOp::Sum(c) => {
            let _ = write!(out, "Sum({c})");
        }
        TerminalOp::Average(c) => {
            let _ = write!(out, "Average({c})");
        }
        TerminalOp::Min(c) => {
            let _ = write!(out, "Min({c})");
        }
        TerminalOp::Max(c) => {
            let _ = write!(out, "Max({c})");
        }
        TerminalOp::ToList => out.push_str("ToList"),
        TerminalOp::ToArray => out.push_str("ToArray"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::Constant;

    #[test]
    fn differing_constants_share_a_key() {
        let base = |v: i64| SurfaceQuery {
            table_name: "t".into(),
            ops: vec![SurfaceOp::Filter(SurfaceExpr::Compare {
                column: "age".into(),
                op: crate::predicate::CompareOp::Gt,
                value: Constant::I64(v),
            })],
            terminal: TerminalOp::Count,
        };
        assert_eq!(canonical_key(&base(10)), canonical_key(&base(99)));
    }

    #[test]
    fn differing_columns_diverge() {
        let q1 = SurfaceQuery {
            table_name: "t".into(),
            ops: vec![SurfaceOp::Filter(SurfaceExpr::IsNull("a".into()))],
            terminal: TerminalOp::Count,
        };
        let q2 = SurfaceQuery {
            table_name: "t".into(),
            ops: vec![SurfaceOp::Filter(SurfaceExpr::IsNull("b".into()))],
            terminal: TerminalOp::Count,
        };
        assert_ne!(canonical_key(&q1), canonical_key(&q2));
    }
}

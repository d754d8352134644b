//! Scalar output values: the result of a no-group-by `Aggregate`, and the
//! per-column cell type a `GroupTable` row carries. Grounded on
//! `datafusion-common`'s `ScalarValue` — a closed enum rather than a boxed
//! `dyn Any`, so the executor's aggregate finalizers stay exhaustive-match
//! checked against `LogicalType`.

use crate::schema::LogicalType;

/// A single typed scalar, as produced by `Count`/`Sum`/`Avg`/`Min`/`Max`
/// with no `GroupBy`, as one cell of a `GroupTable` row, or as a `Key`
/// value for a string-typed `GroupBy` column.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Str(String),
    Null,
}

impl ScalarValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::I64(v) => Some(*v as f64),
            ScalarValue::U64(v) => Some(*v as f64),
            ScalarValue::F64(v) => Some(*v),
            ScalarValue::Bool(v) => Some(*v as i32 as f64),
            ScalarValue::Str(_) | ScalarValue::Null => None,
        }
    }

    /// Casts a finalized `f64` accumulator back to the aggregate's declared
    /// output type, the way the `Aggregate`/`GroupAggregation` node that
    /// produced it recorded in its `output_type` field.
    pub fn from_f64_as(value: f64, output_type: LogicalType) -> Self {
        use LogicalType::*;
        match output_type {
            I8 | I16 | I32 | I64 | Date32 | Date64 | Timestamp => ScalarValue::I64(value.round() as i64),
            U8 | U16 | U32 | U64 => ScalarValue::U64(value.round() as u64),
            F32 | F64 | Decimal => ScalarValue::F64(value),
            Bool => ScalarValue::Bool(value != 0.0),
            Utf8 => ScalarValue::Null,
        }
    }
}

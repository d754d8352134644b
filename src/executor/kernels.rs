//! Small per-row/per-chunk reading helpers shared by the filter,
//! aggregate, group-by and materialization kernels. Grounded on the same
//! downcast-by-`LogicalType` dispatch `zonemap.rs` already uses for
//! chunk summaries, reused here at row granularity.

use arrow_array::{
    Array, BooleanArray, Date32Array, Date64Array, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    Int8Array, StringArray, TimestampMicrosecondArray, UInt16Array, UInt32Array, UInt64Array, UInt8Array,
};
use arrow_array::ArrayRef;

use crate::bitmap::SelectionBitmap;
use crate::schema::{ColumnStore, LogicalType};
use crate::value::ScalarValue;

/// Reads row `i` of a numeric column as `f64`, or `None` if null. Every
/// aggregate accumulator widens through this single conversion point so
/// `Sum`/`Avg`/`Min`/`Max` share one code path regardless of storage type.
pub fn read_numeric_as_f64(array: &ArrayRef, logical_type: LogicalType, i: usize) -> Option<f64> {
    use LogicalType::*;
    macro_rules! get {
        ($arr_ty:ty) => {{
            let a = array.as_any().downcast_ref::<$arr_ty>().unwrap();
            if a.is_null(i) {
                None
            } else {
                Some(a.value(i) as f64)
            }
        }};
    }
    match logical_type {
        I8 => get!(Int8Array),
        I16 => get!(Int16Array),
        I32 => get!(Int32Array),
        I64 => get!(Int64Array),
        U8 => get!(UInt8Array),
        U16 => get!(UInt16Array),
        U32 => get!(UInt32Array),
        U64 => get!(UInt64Array),
        F32 => get!(Float32Array),
        F64 | Decimal => get!(Float64Array),
        Date32 => get!(Date32Array),
        Date64 => get!(Date64Array),
        Timestamp => get!(TimestampMicrosecondArray),
        Bool => {
            let a = array.as_any().downcast_ref::<BooleanArray>().unwrap();
            if a.is_null(i) {
                None
            } else {
                Some(a.value(i) as i32 as f64)
            }
        }
        Utf8 => None,
    }
}

/// Reads row `i` of any column as a [`ScalarValue`], resolving
/// dictionary-encoded string columns through their side table. Used by
/// materialization and by group-by key extraction.
pub fn read_scalar(store: &dyn ColumnStore, column: usize, i: usize) -> ScalarValue {
    let col = store.column(column);
    let logical_type = col.def.logical_type;
    if logical_type == LogicalType::Utf8 {
        if let Some((indices, values)) = store.dictionary_of(column) {
            let indices = indices.as_any().downcast_ref::<Int32Array>().unwrap();
            if indices.is_null(i) {
                return ScalarValue::Null;
            }
            let values = values.as_any().downcast_ref::<StringArray>().unwrap();
            let idx = indices.value(i) as usize;
            return if values.is_null(idx) {
                ScalarValue::Null
            } else {
                ScalarValue::Str(values.value(idx).to_string())
            };
        }
        let arr = col.array.as_any().downcast_ref::<StringArray>().unwrap();
        return if arr.is_null(i) {
            ScalarValue::Null
        } else {
            ScalarValue::Str(arr.value(i).to_string())
        };
    }
    if logical_type == LogicalType::Bool {
        let arr = col.array.as_any().downcast_ref::<BooleanArray>().unwrap();
        return if arr.is_null(i) { ScalarValue::Null } else { ScalarValue::Bool(arr.value(i)) };
    }
    match read_numeric_as_f64(col.array, logical_type, i) {
        None => ScalarValue::Null,
        Some(v) => ScalarValue::from_f64_as(v, logical_type),
    }
}

/// `true` when every word backing `[start, end)` is zero — the chunk has
/// nothing left to test and predicate evaluation for it can be skipped.
/// Relies on chunk boundaries being word-aligned (chunk sizes are always
/// multiples of 64 rows).
pub fn chunk_is_empty(bitmap: &SelectionBitmap, start: usize, end: usize) -> bool {
    let w0 = start / 64;
    let w1 = (end + 63) / 64;
    bitmap.words()[w0..w1.min(bitmap.words().len())].iter().all(|&w| w == 0)
}

/// Popcount restricted to `[start, end)`, word-aligned.
pub fn count_set_range(bitmap: &SelectionBitmap, start: usize, end: usize) -> u64 {
    let w0 = start / 64;
    let w1 = (end + 63) / 64;
    bitmap.words()[w0..w1.min(bitmap.words().len())]
        .iter()
        .map(|w| w.count_ones() as u64)
        .sum()
}

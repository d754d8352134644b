//! Sort, limit and offset over a columnar row selection. Grounded on
//! `datafusion-physical-plan`'s `sorts/sort.rs` row-comparator approach,
//! scaled down to an in-memory `Vec<u64>` of row ids since this engine
//! never spills — the comparator still reads one column at a time rather
//! than building a composite sort key up front, the way a multi-key
//! `ORDER BY` comparator chain normally does.

use std::cmp::Ordering;

use crate::bitmap::SelectionBitmap;
use crate::plan::{SortDirection, SortKey};
use crate::schema::ColumnStore;

use super::kernels::read_scalar;
use crate::value::ScalarValue;

fn cmp_scalars(a: &ScalarValue, b: &ScalarValue) -> Ordering {
    match (a, b) {
        (ScalarValue::Str(x), ScalarValue::Str(y)) => x.cmp(y),
        (ScalarValue::Bool(x), ScalarValue::Bool(y)) => x.cmp(y),
        (ScalarValue::Null, ScalarValue::Null) => Ordering::Equal,
        (ScalarValue::Null, _) => Ordering::Less,
        (_, ScalarValue::Null) => Ordering::Greater,
        _ => a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal),
    }
}

/// Stable sort of the selected row ids by `orderings`, each key
/// compared in turn until one breaks the tie.
pub fn sort(store: &dyn ColumnStore, bitmap: &SelectionBitmap, orderings: &[SortKey]) -> Vec<u64> {
    let mut ids = bitmap.get_selected_indices();
    ids.sort_by(|&a, &b| {
        for key in orderings {
            let va = read_scalar(store, key.column, a as usize);
            let vb = read_scalar(store, key.column, b as usize);
            let ord = cmp_scalars(&va, &vb);
            let ord = if key.direction == SortDirection::Desc { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    ids
}

/// Truncates an explicit row order to its first `count` ids.
pub fn limit_ids(ids: Vec<u64>, count: u64) -> Vec<u64> {
    ids.into_iter().take(count as usize).collect()
}

/// Drops the first `count` ids of an explicit row order.
pub fn offset_ids(ids: Vec<u64>, count: u64) -> Vec<u64> {
    ids.into_iter().skip(count as usize).collect()
}

/// Applies `Limit` directly to a bitmap with no prior explicit order: the
/// first `count` set bits survive, enumerated in ascending row-id order.
pub fn limit_bitmap(bitmap: &SelectionBitmap, count: u64) -> SelectionBitmap {
    let mut out = SelectionBitmap::new(bitmap.len(), crate::bitmap::Initial::AllZero);
    let mut kept = 0u64;
    bitmap.for_each_set(|row| {
        if kept < count {
            out.set(row);
            kept += 1;
        }
    });
    out
}

/// Applies `Offset` directly to a bitmap with no prior explicit order:
/// drops the first `count` set bits.
pub fn offset_bitmap(bitmap: &SelectionBitmap, count: u64) -> SelectionBitmap {
    let mut out = SelectionBitmap::new(bitmap.len(), crate::bitmap::Initial::AllZero);
    let mut skipped = 0u64;
    bitmap.for_each_set(|row| {
        if skipped < count {
            skipped += 1;
        } else {
            out.set(row);
        }
    });
    out
}

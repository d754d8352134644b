//! Distinct kernel for a columnar row selection: full-row equality over
//! the snapshot's own columns, insertion-order preserving. Grounded on
//! `datafusion-physical-plan`'s `aggregates` distinct-via-group-by
//! strategy, simplified here to a plain hash set of encoded row keys
//! since there is no further aggregation riding along.

use std::collections::HashSet;

use crate::schema::ColumnStore;

use super::kernels::read_scalar;
use crate::value::ScalarValue;

fn row_key(store: &dyn ColumnStore, row: u64) -> Vec<ScalarValue> {
    (0..store.schema().len()).map(|c| read_scalar(store, c, row as usize)).collect()
}

/// Filters `ids` down to the first occurrence of each distinct row,
/// comparing every column in the snapshot's schema.
pub fn distinct_rows(store: &dyn ColumnStore, ids: Vec<u64>) -> Vec<u64> {
    let mut seen: HashSet<String> = HashSet::with_capacity(ids.len());
    ids.into_iter()
        .filter(|&row| {
            let key = format!("{:?}", row_key(store, row));
            seen.insert(key)
        })
        .collect()
}

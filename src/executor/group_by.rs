//! Group-by kernel: partitions selected rows by key and folds each
//! group's `Count`/`Sum`/`Avg`/`Min`/`Max` members, then a handful of
//! helpers for running `Project`/`Limit`/`Offset`/`Sort`/`Distinct` over
//! the resulting in-memory table. Grounded on
//! `datafusion-physical-plan`'s `aggregates/row_hash.rs` group-value
//! encoding, simplified from its row-format encoder to a small closed
//! `GroupKey` enum since this engine's group columns are never composite.

use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::bitmap::SelectionBitmap;
use crate::error::Result;
use crate::plan::{GroupAggregation, Projection, SortDirection, SortKey};
use crate::schema::{ColumnStore, LogicalType, SchemaRef};
use crate::value::ScalarValue;

use super::kernels::read_numeric_as_f64;
use crate::render::GroupTable;

/// A group-by key value, hashable and orderable so both the `Hash` and
/// `Sorted` strategies can use it directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    I64(i64),
    U64(u64),
    /// Float keys compare by bit pattern — exact equality only, which is
    /// what a `GroupBy` on a floating column can offer anyway.
    F64Bits(u64),
    Bool(bool),
    Str(String),
    Null,
}

fn read_group_key(store: &dyn ColumnStore, column: usize, key_type: LogicalType, row: usize) -> GroupKey {
    if key_type == LogicalType::Utf8 {
        return match super::kernels::read_scalar(store, column, row) {
            ScalarValue::Str(s) => GroupKey::Str(s),
            _ => GroupKey::Null,
        };
    }
    let col = store.column(column);
    match read_numeric_as_f64(col.array, key_type, row) {
        None => GroupKey::Null,
        Some(v) => {
            if key_type == LogicalType::Bool {
                GroupKey::Bool(v != 0.0)
            } else if key_type.is_floating() {
                GroupKey::F64Bits(v.to_bits())
            } else if matches!(
                key_type,
                LogicalType::U8 | LogicalType::U16 | LogicalType::U32 | LogicalType::U64
            ) {
                GroupKey::U64(v as u64)
            } else {
                GroupKey::I64(v as i64)
            }
        }
    }
}

fn group_key_to_scalar(key: &GroupKey, key_type: LogicalType) -> ScalarValue {
    match key {
        GroupKey::I64(v) => ScalarValue::from_f64_as(*v as f64, key_type),
        GroupKey::U64(v) => ScalarValue::from_f64_as(*v as f64, key_type),
        GroupKey::F64Bits(bits) => ScalarValue::from_f64_as(f64::from_bits(*bits), key_type),
        GroupKey::Bool(v) => ScalarValue::Bool(*v),
        GroupKey::Str(s) => ScalarValue::Str(s.clone()),
        GroupKey::Null => ScalarValue::Null,
    }
}

/// One group's per-member running state, in lockstep with the
/// `GroupAggregation` list the `GroupBy` node carries.
#[derive(Debug, Clone)]
enum Slot {
    Key,
    Count(u64),
    Sum { column: usize, total: f64 },
    Avg { column: usize, total: f64, seen: u64 },
    Min { column: usize, value: Option<f64> },
    Max { column: usize, value: Option<f64> },
}

fn new_slots(aggregations: &[GroupAggregation]) -> Vec<Slot> {
    aggregations
        .iter()
        .map(|a| match a {
            GroupAggregation::Key => Slot::Key,
            GroupAggregation::Count { .. } => Slot::Count(0),
            GroupAggregation::Sum { column, .. } => Slot::Sum { column: *column, total: 0.0 },
            GroupAggregation::Avg { column, .. } => Slot::Avg { column: *column, total: 0.0, seen: 0 },
            GroupAggregation::Min { column, .. } => Slot::Min { column: *column, value: None },
            GroupAggregation::Max { column, .. } => Slot::Max { column: *column, value: None },
        })
        .collect()
}

fn absorb_row(store: &dyn ColumnStore, slots: &mut [Slot], row: usize) {
    for slot in slots.iter_mut() {
        match slot {
            Slot::Key => {}
            Slot::Count(n) => *n += 1,
            Slot::Sum { column, total } => {
                let col = store.column(*column);
                if let Some(v) = read_numeric_as_f64(col.array, col.def.logical_type, row) {
                    *total += v;
                }
            }
            Slot::Avg { column, total, seen } => {
                let col = store.column(*column);
                if let Some(v) = read_numeric_as_f64(col.array, col.def.logical_type, row) {
                    *total += v;
                    *seen += 1;
                }
            }
            Slot::Min { column, value } => {
                let col = store.column(*column);
                if let Some(v) = read_numeric_as_f64(col.array, col.def.logical_type, row) {
                    *value = Some(value.map_or(v, |m| v.min(m)));
                }
            }
            Slot::Max { column, value } => {
                let col = store.column(*column);
                if let Some(v) = read_numeric_as_f64(col.array, col.def.logical_type, row) {
                    *value = Some(value.map_or(v, |m| v.max(m)));
                }
            }
        }
    }
}

fn finalize_row(key: &GroupKey, key_type: LogicalType, slots: &[Slot], schema: &SchemaRef) -> Vec<ScalarValue> {
    slots
        .iter()
        .enumerate()
        .map(|(i, slot)| match slot {
            Slot::Key => group_key_to_scalar(key, key_type),
            Slot::Count(n) => ScalarValue::U64(*n),
            Slot::Sum { total, .. } => ScalarValue::from_f64_as(*total, schema.columns()[i].logical_type),
            Slot::Avg { total, seen, .. } => {
                let avg = if *seen == 0 { 0.0 } else { *total / *seen as f64 };
                ScalarValue::from_f64_as(avg, schema.columns()[i].logical_type)
            }
            Slot::Min { value, .. } => ScalarValue::from_f64_as(value.unwrap_or(0.0), schema.columns()[i].logical_type),
            Slot::Max { value, .. } => ScalarValue::from_f64_as(value.unwrap_or(0.0), schema.columns()[i].logical_type),
        })
        .collect()
}

/// Hash-based grouping: visits every selected row once, keyed by an
/// `IndexMap` so the output preserves first-appearance order without any
/// extra bookkeeping (insertion order is `IndexMap`'s native iteration
/// order).
fn execute_hash(
    store: &dyn ColumnStore,
    bitmap: &SelectionBitmap,
    group_column: usize,
    key_type: LogicalType,
    aggregations: &[GroupAggregation],
    schema: &SchemaRef,
) -> GroupTable {
    let mut groups: IndexMap<GroupKey, Vec<Slot>> = IndexMap::new();
    bitmap.for_each_set(|row| {
        let key = read_group_key(store, group_column, key_type, row);
        let slots = groups.entry(key).or_insert_with(|| new_slots(aggregations));
        absorb_row(store, slots, row);
    });
    let rows = groups
        .iter()
        .map(|(key, slots)| finalize_row(key, key_type, slots, schema))
        .collect();
    GroupTable { schema: schema.clone(), rows }
}

/// Sorted-key streaming grouping: the write path declared `group_column`
/// arrives in ascending order, so groups can be finalized as soon as the
/// key changes instead of being held in a hash map for the whole scan.
fn execute_sorted(
    store: &dyn ColumnStore,
    bitmap: &SelectionBitmap,
    group_column: usize,
    key_type: LogicalType,
    aggregations: &[GroupAggregation],
    schema: &SchemaRef,
) -> GroupTable {
    let mut rows = Vec::new();
    let mut current: Option<(GroupKey, Vec<Slot>)> = None;
    bitmap.for_each_set(|row| {
        let key = read_group_key(store, group_column, key_type, row);
        match &mut current {
            Some((current_key, slots)) if *current_key == key => {
                absorb_row(store, slots, row);
            }
            _ => {
                if let Some((prev_key, prev_slots)) = current.take() {
                    rows.push(finalize_row(&prev_key, key_type, &prev_slots, schema));
                }
                let mut slots = new_slots(aggregations);
                absorb_row(store, &mut slots, row);
                current = Some((key, slots));
            }
        }
    });
    if let Some((key, slots)) = current {
        rows.push(finalize_row(&key, key_type, &slots, schema));
    }
    GroupTable { schema: schema.clone(), rows }
}

pub fn execute(
    store: &dyn ColumnStore,
    bitmap: &SelectionBitmap,
    group_column: usize,
    key_type: LogicalType,
    aggregations: &[GroupAggregation],
    sorted: bool,
    schema: SchemaRef,
) -> Result<GroupTable> {
    Ok(if sorted {
        execute_sorted(store, bitmap, group_column, key_type, aggregations, &schema)
    } else {
        execute_hash(store, bitmap, group_column, key_type, aggregations, &schema)
    })
}

pub fn project(table: GroupTable, projections: &[Projection]) -> Result<GroupTable> {
    let schema = std::sync::Arc::new(crate::schema::Schema::new(
        projections
            .iter()
            .map(|p| match p {
                Projection::Column { source, output_name } => {
                    let mut def = table.schema.columns()[*source].clone();
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
            .collect(),
    ));
    let rows = table
        .rows
        .into_iter()
        .map(|row| {
            projections
                .iter()
                .map(|p| match p {
                    Projection::Column { source, .. } => row[*source].clone(),
                    Projection::Computed { .. } => ScalarValue::Null,
                })
                .collect()
        })
        .collect();
    Ok(GroupTable { schema, rows })
}

pub fn limit(mut table: GroupTable, count: usize) -> GroupTable {
    table.rows.truncate(count);
    table
}

pub fn offset(mut table: GroupTable, count: usize) -> GroupTable {
    table.rows.drain(0..count.min(table.rows.len()));
    table
}

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

pub fn sort(mut table: GroupTable, orderings: &[SortKey]) -> GroupTable {
    table.rows.sort_by(|a, b| {
        for key in orderings {
            let ord = cmp_scalars(&a[key.column], &b[key.column]);
            let ord = if key.direction == SortDirection::Desc { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    table
}

pub fn distinct(mut table: GroupTable) -> GroupTable {
    let mut seen = std::collections::HashSet::new();
    table.rows.retain(|row| {
        let key = format!("{row:?}");
        seen.insert(key)
    });
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, Encoding, Schema};
    use arrow_array::{ArrayRef, Int32Array};
    use crate::bitmap::Initial;
    use std::sync::Arc;

    struct FakeStore {
        schema: Schema,
        columns: Vec<ArrayRef>,
    }
    impl ColumnStore for FakeStore {
        fn schema(&self) -> &Schema {
            &self.schema
        }
        fn row_count(&self) -> u64 {
            self.columns[0].len() as u64
        }
        fn column(&self, index: usize) -> crate::schema::ColumnRef<'_> {
            crate::schema::ColumnRef {
                array: &self.columns[index],
                def: &self.schema.columns()[index],
            }
        }
        fn dictionary_of(&self, _index: usize) -> Option<(&ArrayRef, &ArrayRef)> {
            None
        }
    }

    fn build_store() -> FakeStore {
        let keys: ArrayRef = Arc::new(Int32Array::from(vec![1, 2, 1, 3, 2, 1]));
        let values: ArrayRef = Arc::new(Int32Array::from(vec![10, 20, 30, 40, 50, 60]));
        FakeStore {
            schema: Schema::new(vec![
                ColumnDef { name: "k".into(), logical_type: LogicalType::I32, nullable: false, encoding: Encoding::Plain },
                ColumnDef { name: "v".into(), logical_type: LogicalType::I32, nullable: false, encoding: Encoding::Plain },
            ]),
            columns: vec![keys, values],
        }
    }

    fn out_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            ColumnDef { name: "key".into(), logical_type: LogicalType::I32, nullable: false, encoding: Encoding::Plain },
            ColumnDef { name: "total".into(), logical_type: LogicalType::I64, nullable: false, encoding: Encoding::Plain },
        ]))
    }

    #[test]
    fn hash_grouping_preserves_first_appearance_order() {
        let store = build_store();
        let bm = SelectionBitmap::new(6, Initial::AllOne);
        let aggs = vec![GroupAggregation::Key, GroupAggregation::Sum { column: 1, output_name: "total".into() }];
        let table = execute_hash(&store, &bm, 0, LogicalType::I32, &aggs, &out_schema());
        let keys: Vec<_> = table.rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(keys, vec![ScalarValue::I64(1), ScalarValue::I64(2), ScalarValue::I64(3)]);
        assert_eq!(table.rows[0][1], ScalarValue::I64(100)); // 10 + 30 + 60
    }

    #[test]
    fn distinct_drops_duplicate_rows() {
        let schema = out_schema();
        let table = GroupTable {
            schema: schema.clone(),
            rows: vec![
                vec![ScalarValue::I64(1), ScalarValue::I64(5)],
                vec![ScalarValue::I64(1), ScalarValue::I64(5)],
                vec![ScalarValue::I64(2), ScalarValue::I64(5)],
            ],
        };
        let deduped = distinct(table);
        assert_eq!(deduped.rows.len(), 2);
    }
}

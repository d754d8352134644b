//! Shared snapshot builders for the integration scenarios in this
//! directory. Kept in one place so each scenario file stays focused on the
//! plan/assertion it's actually testing, the way `datafusion-optimizer`'s
//! `tests/integration-test.rs` factors its fixture setup out of the
//! individual cases.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::{ArrayRef, BooleanArray, Float64Array, Int32Array, StringArray};
use columnar_engine::schema::{ColumnDef, Encoding, LogicalType, Schema, SchemaRef, Snapshot};

pub fn int32_schema(names: &[&str]) -> SchemaRef {
    Arc::new(Schema::new(
        names
            .iter()
            .map(|n| ColumnDef {
                name: n.to_string(),
                logical_type: LogicalType::I32,
                nullable: false,
                encoding: Encoding::Plain,
            })
            .collect(),
    ))
}

/// A single `i32` column snapshot named `age`.
pub fn age_snapshot(values: Vec<i32>) -> Snapshot {
    let schema = int32_schema(&["age"]);
    let arr: ArrayRef = Arc::new(Int32Array::from(values));
    Snapshot::try_new(schema, vec![arr], HashMap::new()).unwrap()
}

/// `age: i32`, `salary: f64` (stands in for `Decimal`), `performance: f64`,
/// `is_active: bool` — enough columns to build Scenarios C and D.
pub fn workforce_snapshot(
    ages: Vec<i32>,
    salaries: Vec<f64>,
    performance: Vec<f64>,
    is_active: Vec<bool>,
) -> Snapshot {
    let schema = Arc::new(Schema::new(vec![
        ColumnDef {
            name: "age".into(),
            logical_type: LogicalType::I32,
            nullable: false,
            encoding: Encoding::Plain,
        },
        ColumnDef {
            name: "salary".into(),
            logical_type: LogicalType::Decimal,
            nullable: false,
            encoding: Encoding::Plain,
        },
        ColumnDef {
            name: "performance".into(),
            logical_type: LogicalType::F64,
            nullable: false,
            encoding: Encoding::Plain,
        },
        ColumnDef {
            name: "is_active".into(),
            logical_type: LogicalType::Bool,
            nullable: false,
            encoding: Encoding::Plain,
        },
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int32Array::from(ages)),
        Arc::new(Float64Array::from(salaries)),
        Arc::new(Float64Array::from(performance)),
        Arc::new(BooleanArray::from(is_active)),
    ];
    Snapshot::try_new(schema, columns, HashMap::new()).unwrap()
}

/// A single dictionary-encoded `utf8` column named `name`: `indices` point
/// into `dictionary` (deduplicated values), the way the write path would
/// hand the engine a run- or dictionary-encoded string column.
pub fn dictionary_string_snapshot(indices: Vec<i32>, dictionary: Vec<&str>) -> Snapshot {
    let schema = Arc::new(Schema::new(vec![ColumnDef {
        name: "name".into(),
        logical_type: LogicalType::Utf8,
        nullable: false,
        encoding: Encoding::Dictionary,
    }]));
    let index_array: ArrayRef = Arc::new(Int32Array::from(indices.clone()));
    let value_array: ArrayRef = Arc::new(StringArray::from(dictionary));
    let mut dictionaries = HashMap::new();
    dictionaries.insert(0usize, (index_array.clone(), value_array));
    // The plain column buffer is unused on the dictionary path but must
    // still exist and agree on row count.
    Snapshot::try_new(schema, vec![index_array], dictionaries).unwrap()
}

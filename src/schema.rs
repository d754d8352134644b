//! Schema descriptor and the `ColumnStore` external-collaborator interface.
//!
//! The source pattern reflects a schema at runtime from attributes on a
//! record definition; this redesign replaces that with a schema declared
//! once at snapshot construction. The column-index map is built here and
//! never mutated afterwards — it is a field of the schema, not of any
//! predicate (see the mutable-predicate-column-index bug called out as
//! "do not replicate" in the design notes).

use std::sync::Arc;

use arrow_array::ArrayRef;
use hashbrown::HashMap;

use crate::error::{EngineError, Result};

/// Logical column type, independent of its physical Arrow encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
    Bool,
    Utf8,
    Date32,
    Date64,
    Timestamp,
}

impl LogicalType {
    pub fn is_numeric(self) -> bool {
        !matches!(self, LogicalType::Bool | LogicalType::Utf8)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, LogicalType::F32 | LogicalType::F64)
    }
}

/// Physical storage encoding of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Plain,
    Dictionary,
    RunLength,
}

/// One column's static, immutable metadata.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub logical_type: LogicalType,
    pub nullable: bool,
    pub encoding: Encoding,
}

/// An ordered list of `ColumnDef`s plus a name → index lookup, built once
/// and shared read-only by every plan and predicate that references it.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<ColumnDef>,
    index_of: HashMap<String, usize>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        let index_of = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self { columns, index_of }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index_of.get(name).copied()
    }

    pub fn column(&self, index: usize) -> Option<&ColumnDef> {
        self.columns.get(index)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.index_of(name).ok_or_else(|| {
            EngineError::PlanConstruction(format!("unknown column `{name}`"))
        })
    }

    /// Returns a new schema containing only the named columns, in the order given.
    pub fn project(&self, names: &[String]) -> Result<Schema> {
        let columns = names
            .iter()
            .map(|n| {
                self.index_of(n)
                    .map(|i| self.columns[i].clone())
                    .ok_or_else(|| {
                        EngineError::PlanConstruction(format!(
                            "projection references unknown column `{n}`"
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Schema::new(columns))
    }
}

pub type SchemaRef = Arc<Schema>;

/// A cheap, non-owning handle to a column's data within a snapshot.
/// Safe to share across threads reading concurrently.
pub struct ColumnRef<'a> {
    pub array: &'a ArrayRef,
    pub def: &'a ColumnDef,
}

impl<'a> ColumnRef<'a> {
    /// Arrow's byte-packed, LSB-first-within-a-byte validity layout, if the
    /// column is nullable and actually carries nulls.
    pub fn validity_bitmap_bytes(&self) -> Option<&'a [u8]> {
        self.array
            .nulls()
            .map(|nulls| nulls.buffer().as_slice())
    }
}

/// The external collaborator that owns an immutable, N-row columnar
/// snapshot. The engine never writes through this interface.
pub trait ColumnStore: Send + Sync {
    fn schema(&self) -> &Schema;
    fn row_count(&self) -> u64;
    fn column(&self, index: usize) -> ColumnRef<'_>;
    /// `Some((indices, values))` for dictionary-encoded columns.
    fn dictionary_of(&self, index: usize) -> Option<(&ArrayRef, &ArrayRef)>;

    /// Whether the snapshot's write path recorded that `index` arrives
    /// already sorted ascending. The physical planner only picks
    /// `SortedAggregate` for a `GroupBy` key when this returns true;
    /// absent any such metadata the engine must not assume sort order.
    fn sorted_hint(&self, _index: usize) -> bool {
        false
    }
}

/// The default, in-process `ColumnStore`: a transposed batch of Arrow
/// arrays built once by the (external) columnar write path and handed to
/// the engine as an immutable snapshot.
pub struct Snapshot {
    schema: SchemaRef,
    columns: Vec<ArrayRef>,
    dictionaries: HashMap<usize, (ArrayRef, ArrayRef)>,
    row_count: u64,
    sorted_hints: HashMap<usize, bool>,
}

impl Snapshot {
    pub fn try_new(
        schema: SchemaRef,
        columns: Vec<ArrayRef>,
        dictionaries: HashMap<usize, (ArrayRef, ArrayRef)>,
    ) -> Result<Self> {
        Self::try_new_with_sorted_hints(schema, columns, dictionaries, HashMap::new())
    }

    /// As [`Snapshot::try_new`], additionally recording which columns the
    /// (external) write path already produced in ascending sorted order.
    /// The physical planner consults this to pick `SortedAggregate` for a
    /// `GroupBy` key; never inferred by scanning, only ever declared.
    pub fn try_new_with_sorted_hints(
        schema: SchemaRef,
        columns: Vec<ArrayRef>,
        dictionaries: HashMap<usize, (ArrayRef, ArrayRef)>,
        sorted_hints: HashMap<usize, bool>,
    ) -> Result<Self> {
        if schema.len() != columns.len() {
            return Err(EngineError::PlanConstruction(format!(
                "schema has {} columns but {} arrays were supplied",
                schema.len(),
                columns.len()
            )));
        }
        let row_count = columns.first().map(|c| c.len() as u64).unwrap_or(0);
        for (i, col) in columns.iter().enumerate() {
            if col.len() as u64 != row_count {
                return Err(EngineError::PlanConstruction(format!(
                    "column {i} has {} rows, expected {row_count}",
                    col.len()
                )));
            }
        }
        Ok(Self {
            schema,
            columns,
            dictionaries,
            row_count,
            sorted_hints,
        })
    }

    pub fn schema_ref(&self) -> SchemaRef {
        self.schema.clone()
    }
}

impl ColumnStore for Snapshot {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn row_count(&self) -> u64 {
        self.row_count
    }

    fn column(&self, index: usize) -> ColumnRef<'_> {
        ColumnRef {
            array: &self.columns[index],
            def: &self.schema.columns()[index],
        }
    }

    fn sorted_hint(&self, index: usize) -> bool {
        self.sorted_hints.get(&index).copied().unwrap_or(false)
    }

    fn dictionary_of(&self, index: usize) -> Option<(&ArrayRef, &ArrayRef)> {
        self.dictionaries.get(&index).map(|(i, v)| (i, v))
    }
}

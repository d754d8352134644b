//! Per-column, per-chunk min/max/all-null summaries used to skip whole
//! chunks before a predicate ever touches them.
//!
//! Built once at snapshot publication (grounded on the file-level
//! statistics pass in `datasource/statistics.rs`, here collapsed to a
//! single in-memory pass with no I/O). Chunk boundaries are locked to the
//! execution chunk size so the zone map and the parallel filter/aggregate
//! kernels agree on where a chunk starts and ends.

use arrow_array::{Array, Float32Array, Float64Array};
use arrow_array::{Int16Array, Int32Array, Int64Array, Int8Array};
use arrow_array::{UInt16Array, UInt32Array, UInt64Array, UInt8Array};
use hashbrown::HashMap;

use crate::schema::{ColumnStore, LogicalType};

/// A chunk's numeric bound. Variants line up with `LogicalType`'s numeric
/// members; comparisons cross-cast losslessly enough for pruning purposes
/// (pruning is conservative by construction, never exact).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneBound {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl ZoneBound {
    pub fn as_f64(self) -> f64 {
        match self {
            ZoneBound::Signed(v) => v as f64,
            ZoneBound::Unsigned(v) => v as f64,
            ZoneBound::Float(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkSummary {
    pub min: ZoneBound,
    pub max: ZoneBound,
    pub all_null: bool,
    /// Set when the chunk contains a NaN (or is otherwise unsummarizable);
    /// forces `may_contain_matches` to always answer `true`.
    pub conservative: bool,
}

/// Per-column chunk summaries.
#[derive(Debug, Clone)]
pub struct ZoneMap {
    pub chunks: Vec<ChunkSummary>,
}

/// All zone maps for a snapshot, keyed by column index. Columns with no
/// entry (string, boolean, or zone maps disabled) are treated as
/// "always scan" by callers.
#[derive(Debug, Clone, Default)]
pub struct SnapshotZoneMaps {
    per_column: HashMap<usize, ZoneMap>,
}

impl SnapshotZoneMaps {
    pub fn get(&self, column_index: usize) -> Option<&ZoneMap> {
        self.per_column.get(&column_index)
    }

    /// Builds zone maps for every numeric column in `store`. String and
    /// boolean columns are skipped — the optimizer assumes their absence
    /// rather than treating it as a temporary limitation.
    pub fn build(store: &dyn ColumnStore, chunk_size: usize) -> Self {
        let mut per_column = HashMap::new();
        let row_count = store.row_count() as usize;
        for (idx, def) in store.schema().columns().iter().enumerate() {
            if !def.logical_type.is_numeric() {
                continue;
            }
            let col = store.column(idx);
            let mut chunks = Vec::with_capacity(row_count.div_ceil(chunk_size.max(1)));
            let mut start = 0usize;
            while start < row_count {
                let end = (start + chunk_size).min(row_count);
                chunks.push(summarize_chunk(col.array, def.logical_type, start, end));
                start = end;
            }
            if row_count == 0 {
                // An empty snapshot still gets a single, vacuous chunk so
                // callers don't need to special-case N = 0.
                chunks.push(ChunkSummary {
                    min: ZoneBound::Signed(0),
                    max: ZoneBound::Signed(0),
                    all_null: true,
                    conservative: false,
                });
            }
            per_column.insert(idx, ZoneMap { chunks });
        }
        Self { per_column }
    }
}

macro_rules! scan_integer {
    ($arr_ty:ty, $array:expr, $start:expr, $end:expr, $variant:ident) => {{
        let arr = $array.as_any().downcast_ref::<$arr_ty>().unwrap();
        let mut min = None;
        let mut max = None;
        let mut any_valid = false;
        for i in $start..$end {
            if arr.is_null(i) {
                continue;
            }
            any_valid = true;
            let v = arr.value(i);
            min = Some(min.map_or(v, |m: _| if v < m { v } else { m }));
            max = Some(max.map_or(v, |m: _| if v > m { v } else { m }));
        }
        if !any_valid {
            ChunkSummary {
                min: ZoneBound::$variant(0 as _),
                max: ZoneBound::$variant(0 as _),
                all_null: true,
                conservative: false,
            }
        } else {
            ChunkSummary {
                min: ZoneBound::$variant(min.unwrap() as _),
                max: ZoneBound::$variant(max.unwrap() as _),
                all_null: false,
                conservative: false,
            }
        }
    }};
}

macro_rules! scan_float {
    ($arr_ty:ty, $array:expr, $start:expr, $end:expr) => {{
        let arr = $array.as_any().downcast_ref::<$arr_ty>().unwrap();
        let mut min = None;
        let mut max = None;
        let mut any_valid = false;
        let mut has_nan = false;
        for i in $start..$end {
            if arr.is_null(i) {
                continue;
            }
            any_valid = true;
            let v = arr.value(i) as f64;
            if v.is_nan() {
                has_nan = true;
                continue;
            }
            min = Some(min.map_or(v, |m: f64| v.min(m)));
            max = Some(max.map_or(v, |m: f64| v.max(m)));
        }
        if !any_valid {
            ChunkSummary {
                min: ZoneBound::Float(0.0),
                max: ZoneBound::Float(0.0),
                all_null: true,
                conservative: false,
            }
        } else if has_nan {
            // Conservative: never let a NaN-bearing chunk be excluded.
            ChunkSummary {
                min: ZoneBound::Float(f64::NEG_INFINITY),
                max: ZoneBound::Float(f64::INFINITY),
                all_null: false,
                conservative: true,
            }
        } else {
            ChunkSummary {
                min: ZoneBound::Float(min.unwrap()),
                max: ZoneBound::Float(max.unwrap()),
                all_null: false,
                conservative: false,
            }
        }
    }};
}

fn summarize_chunk(
    array: &arrow_array::ArrayRef,
    logical_type: LogicalType,
    start: usize,
    end: usize,
) -> ChunkSummary {
    use LogicalType::*;
    match logical_type {
        I8 => scan_integer!(Int8Array, array, start, end, Signed),
        I16 => scan_integer!(Int16Array, array, start, end, Signed),
        I32 | Date32 => scan_integer!(Int32Array, array, start, end, Signed),
        I64 | Date64 | Timestamp => scan_integer!(Int64Array, array, start, end, Signed),
        U8 => scan_integer!(UInt8Array, array, start, end, Unsigned),
        U16 => scan_integer!(UInt16Array, array, start, end, Unsigned),
        U32 => scan_integer!(UInt32Array, array, start, end, Unsigned),
        U64 => scan_integer!(UInt64Array, array, start, end, Unsigned),
        F32 => scan_float!(Float32Array, array, start, end),
        F64 | Decimal => scan_float!(Float64Array, array, start, end),
        Bool | Utf8 => unreachable!("zone maps are only built for numeric columns"),
    }
}

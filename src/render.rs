//! Query result collaborators: the selection a completed query settles
//! on, and the `Renderer` trait external callers implement to turn that
//! selection into whatever shape they need. Grounded on
//! `datafusion`'s separation between a physical plan's output
//! (`RecordBatchStream`) and the caller-chosen collector
//! (`collect`/`collect_partitioned`/`execute_stream`) — here the
//! selection is a first-class value instead of a stream, since this
//! engine's result sets are always small enough to hold as one bitmap or
//! row list.

use std::ops::Range;

use crate::bitmap::SelectionBitmap;
use crate::error::Result;
use crate::plan::Projection;
use crate::schema::{ColumnStore, SchemaRef};
use crate::value::ScalarValue;

use crate::executor::kernels::read_scalar;

/// Which rows of the original snapshot a `QueryResult` selects, in
/// whichever form the physical plan's last stage happened to produce.
#[derive(Debug, Clone)]
pub enum RowSelection {
    /// An unordered set of rows, as produced directly by `Filter`.
    Bitmap(SelectionBitmap),
    /// A contiguous, already-ordered row range (e.g. an unfiltered scan).
    Range(Range<u64>),
    /// An explicit row order, as produced by `Sort` or by `Distinct`
    /// over a columnar stage.
    SortedIds(Vec<u64>),
}

impl RowSelection {
    pub fn row_count(&self) -> u64 {
        match self {
            RowSelection::Bitmap(b) => b.count_set(),
            RowSelection::Range(r) => r.end.saturating_sub(r.start),
            RowSelection::SortedIds(ids) => ids.len() as u64,
        }
    }

    /// Row ids in ascending visitation order. For `Bitmap` this is
    /// popcount-proportional, not length-proportional (see
    /// `SelectionBitmap::get_selected_indices`).
    pub fn row_ids(&self) -> Vec<u64> {
        match self {
            RowSelection::Bitmap(b) => b.get_selected_indices(),
            RowSelection::Range(r) => (r.start..r.end).collect(),
            RowSelection::SortedIds(ids) => ids.clone(),
        }
    }
}

/// Bookkeeping describing how a `QueryResult` was produced, surfaced to
/// callers that want to log or assert on the strategy actually taken
/// rather than the one requested.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMetadata {
    pub chunks_pruned_by_zone_map: u64,
    pub chunks_scanned: u64,
    pub used_fused_filter_aggregate: bool,
}

/// A materialized group-by table: one row per distinct key, columns in
/// the order the `GroupBy` node's `aggregations` list declares.
#[derive(Debug, Clone)]
pub struct GroupTable {
    pub schema: SchemaRef,
    pub rows: Vec<Vec<ScalarValue>>,
}

/// The terminal artifact of a completed query: either a row selection
/// over the original snapshot (`Filter`/`Sort`/`Limit`/... pipelines) or
/// a materialized scalar/group table (`Aggregate`/`GroupBy`).
#[derive(Debug, Clone)]
pub enum QueryResult {
    Rows {
        selection: RowSelection,
        projection: Option<Vec<Projection>>,
        metadata: ExecutionMetadata,
    },
    Scalar(ScalarValue),
    Group(GroupTable),
}

/// External collaborator that turns a `QueryResult` into a caller-chosen
/// shape `T`. Implementations never see the physical plan, only the
/// selection and the snapshot it selects over — the same boundary
/// `ColumnStore` draws for read access.
pub trait Renderer<T> {
    fn render(&self, store: &dyn ColumnStore, result: &QueryResult) -> Result<T>;
}

/// Renders a `Rows` result as one `Vec<ScalarValue>` per row, reading
/// through `projection` when present or the snapshot's full schema
/// otherwise.
pub struct RowListRenderer;

impl Renderer<Vec<Vec<ScalarValue>>> for RowListRenderer {
    fn render(&self, store: &dyn ColumnStore, result: &QueryResult) -> Result<Vec<Vec<ScalarValue>>> {
        match result {
            QueryResult::Rows { selection, projection, .. } => {
                let ids = selection.row_ids();
                let columns: Vec<usize> = match projection {
                    Some(projections) => projections
                        .iter()
                        .filter_map(|p| match p {
                            Projection::Column { source, .. } => Some(*source),
                            Projection::Computed { .. } => None,
                        })
                        .collect(),
                    None => (0..store.schema().len()).collect(),
                };
                Ok(ids
                    .into_iter()
                    .map(|row| columns.iter().map(|&c| read_scalar(store, c, row as usize)).collect())
                    .collect())
            }
            QueryResult::Scalar(v) => Ok(vec![vec![v.clone()]]),
            QueryResult::Group(table) => Ok(table.rows.clone()),
        }
    }
}

/// Renders a `Rows` result as just the surviving row ids, with no column
/// materialization at all — the cheapest renderer, useful when a caller
/// only needs `COUNT`-style cardinality or row identity.
pub struct RowIdRenderer;

impl Renderer<Vec<u64>> for RowIdRenderer {
    fn render(&self, _store: &dyn ColumnStore, result: &QueryResult) -> Result<Vec<u64>> {
        Ok(match result {
            QueryResult::Rows { selection, .. } => selection.row_ids(),
            QueryResult::Scalar(_) => Vec::new(),
            QueryResult::Group(table) => (0..table.rows.len() as u64).collect(),
        })
    }
}

//! Column predicate family: typed, column-bound row tests that mutate a
//! [`SelectionBitmap`] in place. Grounded on the comparison-kernel split in
//! `datafusion-physical-expr`'s `expressions/binary/kernels_arrow.rs`
//! (scalar kernel per Arrow primitive type, chosen by a dispatch layer)
//! and the devirtualization idea datafusion applies at `PhysicalExpr`
//! evaluation sites.

mod compound;
mod null_bool;
mod numeric;
mod string;

pub use compound::{AndPredicate, NotPredicate, OrPredicate};
pub use null_bool::{BoolTest, BooleanPredicate, IsNotNullPredicate, IsNullPredicate};
pub use numeric::{CompareOp, NumericComparisonPredicate, NumericConstant, RangePredicate};
pub use string::{StringContainsPredicate, StringEndsWithPredicate, StringEqualityPredicate, StringStartsWithPredicate};

use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;

use crate::bitmap::SelectionBitmap;
use crate::error::Result;
use crate::schema::ColumnStore;
use crate::zonemap::ChunkSummary;

/// A fast, devirtualized shape for the handful of predicate kinds that
/// dominate real workloads. The executor's hot loop matches on this
/// before falling back to the generic `ColumnPredicate::evaluate` virtual
/// call; both paths must be semantically identical, the fast path is
/// purely a dispatch optimization.
pub enum FastPath<'a> {
    I32Compare { column: usize, op: CompareOp, constant: i32 },
    I64Compare { column: usize, op: CompareOp, constant: i64 },
    F64Compare { column: usize, op: CompareOp, constant: f64 },
    StringEq { column: usize, constant: &'a str },
}

/// A typed, column-bound comparison (or set/string/null test). Every
/// variant's bound column index is fixed at construction and never
/// mutated afterwards — that property is load-bearing because predicates
/// are shared, read-only, across parallel chunk workers.
pub trait ColumnPredicate: Debug + Send + Sync {
    /// The single column this predicate is bound to, if any. Compound
    /// predicates (AND/OR/NOT) have no single bound column — they defer
    /// to their children.
    fn column_index(&self) -> Option<usize>;

    /// Clears bits in `[range.start, range.end)` of `bitmap` for rows that
    /// do not satisfy the predicate. Must never set a bit that was
    /// already clear.
    fn evaluate(
        &self,
        store: &dyn ColumnStore,
        bitmap: &mut SelectionBitmap,
        range: Range<usize>,
    ) -> Result<()>;

    /// Conservative chunk-skip test: `false` only when the chunk's summary
    /// provably excludes every matching row.
    fn may_contain_matches(&self, summary: &ChunkSummary) -> bool;

    /// Estimated fraction of rows this predicate admits, in `[0, 1]`.
    /// `0.5` is an acceptable value when genuinely unknown.
    fn estimated_selectivity(&self) -> f64;

    /// A devirtualized fast-path shape, if this predicate is one of the
    /// hot, common concrete kinds the executor dispatches directly.
    fn fast_path(&self) -> Option<FastPath<'_>> {
        None
    }

    /// Rebuilds this predicate (and, for compound predicates, every
    /// child) with bound column indices passed through `f`. Used by the
    /// filter-pushdown-through-project rule to translate a predicate from
    /// the projection's output column numbering back to its child's.
    fn remap_columns(&self, f: &dyn Fn(usize) -> usize) -> Arc<dyn ColumnPredicate>;
}

/// Base selectivity rates used by the optimizer when no zone-map coverage
/// estimate is available: equality is the most restrictive, then range,
/// then inequality, then the boolean tests, which stay near 0.5 since
/// either outcome is equally likely absent other information.
pub mod base_rate {
    pub const EQUALITY: f64 = 0.1;
    pub const RANGE: f64 = 0.25;
    pub const INEQUALITY: f64 = 0.33;
    pub const BOOL_TRUE: f64 = 0.5;
    pub const BOOL_FALSE: f64 = 0.5;
    pub const UNKNOWN: f64 = 0.5;
}

//! Aggregate kernels: `Count`/`Sum`/`Avg`/`Min`/`Max` over a selection
//! bitmap, and the fused filter+aggregate path that never materializes
//! an intermediate bitmap. Grounded on `datafusion-physical-expr`'s
//! `Accumulator` trait — one small mutable state object per aggregate,
//! folded chunk by chunk and merged across parallel workers.

use std::sync::Arc;

use rayon::prelude::*;

use crate::bitmap::{BitmapPool, Initial, SelectionBitmap};
use crate::cancellation::CancellationToken;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::physical::AggregateStrategy;
use crate::plan::AggregateOp;
use crate::predicate::ColumnPredicate;
use crate::schema::{ColumnStore, LogicalType};
use crate::value::ScalarValue;
use crate::zonemap::SnapshotZoneMaps;

use super::kernels::{count_set_range, read_numeric_as_f64};

/// Running accumulator state, widened to `f64`/`i128` regardless of the
/// source column's storage width so chunk-partial results merge without
/// per-chunk precision loss.
#[derive(Debug, Clone, Copy)]
pub struct PartialAggregate {
    count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    overflowed: bool,
}

impl PartialAggregate {
    fn empty() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: None,
            max: None,
            overflowed: false,
        }
    }

    fn absorb(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        if !self.sum.is_finite() {
            self.overflowed = true;
        }
        self.min = Some(self.min.map_or(value, |m| value.min(m)));
        self.max = Some(self.max.map_or(value, |m| value.max(m)));
    }

    fn merge(mut self, other: PartialAggregate) -> Self {
        self.count += other.count;
        self.sum += other.sum;
        self.overflowed |= other.overflowed || !self.sum.is_finite();
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, None) => a,
            (None, b) => b,
        };
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, None) => a,
            (None, b) => b,
        };
        self
    }

    fn finalize(self, op: AggregateOp, output_type: LogicalType) -> Result<ScalarValue> {
        if self.overflowed && output_type == LogicalType::Decimal {
            return Err(EngineError::CapacityExceeded(
                "decimal sum exceeded representable precision".into(),
            ));
        }
        Ok(match op {
            AggregateOp::Count => ScalarValue::U64(self.count),
            AggregateOp::Sum => ScalarValue::from_f64_as(self.sum, output_type),
            AggregateOp::Avg => {
                let avg = if self.count == 0 { 0.0 } else { self.sum / self.count as f64 };
                ScalarValue::from_f64_as(avg, output_type)
            }
            AggregateOp::Min => ScalarValue::from_f64_as(self.min.unwrap_or(0.0), output_type),
            AggregateOp::Max => ScalarValue::from_f64_as(self.max.unwrap_or(0.0), output_type),
        })
    }
}

fn accumulate_range(
    store: &dyn ColumnStore,
    bitmap: &SelectionBitmap,
    column: Option<usize>,
    start: usize,
    end: usize,
) -> PartialAggregate {
    let mut acc = PartialAggregate::empty();
    match column {
        None => {
            // COUNT(*): no column to read, just the live-bit popcount.
            acc.count += count_set_range(bitmap, start, end);
        }
        Some(col) => {
            let column_ref = store.column(col);
            let logical_type = column_ref.def.logical_type;
            for i in start..end {
                if !bitmap.get(i) {
                    continue;
                }
                if let Some(v) = read_numeric_as_f64(column_ref.array, logical_type, i) {
                    acc.absorb(v);
                }
            }
        }
    }
    acc
}

/// Runs `Count`/`Sum`/`Avg`/`Min`/`Max` over the rows `bitmap` selects.
pub fn aggregate(
    store: &dyn ColumnStore,
    bitmap: &SelectionBitmap,
    op: AggregateOp,
    column: Option<usize>,
    output_type: LogicalType,
    strategy: AggregateStrategy,
    config: &EngineConfig,
    cancellation: &CancellationToken,
) -> Result<ScalarValue> {
    let len = bitmap.len();
    let acc = match strategy {
        AggregateStrategy::Sequential | AggregateStrategy::Simd => {
            let mut acc = PartialAggregate::empty();
            let mut start = 0;
            while start < len {
                if cancellation.is_canceled() {
                    return Err(EngineError::Canceled);
                }
                let end = (start + config.chunk_size).min(len);
                acc = acc.merge(accumulate_range(store, bitmap, column, start, end));
                start = end;
            }
            acc
        }
        AggregateStrategy::Parallel => {
            let ranges = chunk_ranges(len, config.chunk_size);
            let partials: Vec<Result<PartialAggregate>> = ranges
                .par_iter()
                .map(|&(start, end)| {
                    if cancellation.is_canceled() {
                        return Err(EngineError::Canceled);
                    }
                    Ok(accumulate_range(store, bitmap, column, start, end))
                })
                .collect();
            let mut acc = PartialAggregate::empty();
            for p in partials {
                acc = acc.merge(p?);
            }
            acc
        }
    };
    acc.finalize(op, output_type)
}

fn chunk_ranges(len: usize, chunk_size: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::with_capacity(len.div_ceil(chunk_size.max(1)));
    let mut start = 0;
    while start < len {
        let end = (start + chunk_size).min(len);
        ranges.push((start, end));
        start = end;
    }
    ranges
}

/// Evaluates `predicates` and folds survivors directly into the aggregate
/// accumulator, chunk by chunk, without ever materializing a full
/// selection bitmap for the filtered rows.
pub fn fused_filter_aggregate(
    store: &dyn ColumnStore,
    row_count: u64,
    predicates: &[Arc<dyn ColumnPredicate>],
    op: AggregateOp,
    column: Option<usize>,
    output_type: LogicalType,
    strategy: AggregateStrategy,
    config: &EngineConfig,
    zone_maps: Option<&SnapshotZoneMaps>,
    pool: &Arc<BitmapPool>,
    cancellation: &CancellationToken,
) -> Result<ScalarValue> {
    let len = row_count as usize;
    let ranges = chunk_ranges(len, config.chunk_size);

    let fold_chunk = |chunk_idx: usize, start: usize, end: usize| -> Result<PartialAggregate> {
        if let Some(zm) = zone_maps {
            let pruned = predicates.iter().any(|p| {
                p.column_index()
                    .and_then(|c| zm.get(c))
                    .and_then(|m| m.chunks.get(chunk_idx))
                    .map(|summary| !p.may_contain_matches(summary))
                    .unwrap_or(false)
            });
            if pruned {
                return Ok(PartialAggregate::empty());
            }
        }
        let mut local = pool.acquire(len, Initial::AllOne);
        for p in predicates {
            p.evaluate(store, &mut local, start..end)?;
        }
        Ok(accumulate_range(store, &local, column, start, end))
    };

    let acc = match strategy {
        AggregateStrategy::Sequential | AggregateStrategy::Simd => {
            let mut acc = PartialAggregate::empty();
            for (chunk_idx, &(start, end)) in ranges.iter().enumerate() {
                if cancellation.is_canceled() {
                    return Err(EngineError::Canceled);
                }
                acc = acc.merge(fold_chunk(chunk_idx, start, end)?);
            }
            acc
        }
        AggregateStrategy::Parallel => {
            let partials: Vec<Result<PartialAggregate>> = ranges
                .par_iter()
                .enumerate()
                .map(|(chunk_idx, &(start, end))| {
                    if cancellation.is_canceled() {
                        return Err(EngineError::Canceled);
                    }
                    fold_chunk(chunk_idx, start, end)
                })
                .collect();
            let mut acc = PartialAggregate::empty();
            for p in partials {
                acc = acc.merge(p?);
            }
            acc
        }
    };
    acc.finalize(op, output_type)
}

//! Null and boolean tests.
//!
//! `IsNull`/`IsNotNull` are the only predicates for which a null value can
//! satisfy the test — every other predicate treats null as non-matching,
//! enforced upstream by `and_with_validity_bitmap` before the scalar/SIMD
//! loop even runs.

use std::ops::Range;

use arrow_array::{Array, BooleanArray};

use crate::bitmap::SelectionBitmap;
use crate::error::Result;
use crate::schema::ColumnStore;
use crate::zonemap::ChunkSummary;

use super::{base_rate, ColumnPredicate};

#[derive(Debug)]
pub struct IsNullPredicate {
    column: usize,
}

impl IsNullPredicate {
    pub fn new(column: usize) -> Self {
        Self { column }
    }
}

impl ColumnPredicate for IsNullPredicate {
    fn column_index(&self) -> Option<usize> {
        Some(self.column)
    }

    fn evaluate(
        &self,
        store: &dyn ColumnStore,
        bitmap: &mut SelectionBitmap,
        range: Range<usize>,
    ) -> Result<()> {
        let col = store.column(self.column);
        for i in range {
            if !col.array.is_null(i) {
                bitmap.clear(i);
            }
        }
        Ok(())
    }

    fn may_contain_matches(&self, _summary: &ChunkSummary) -> bool {
        // No zone map tracks null presence directly; the optimizer
        // assumes every chunk may contain a null.
        true
    }

    fn estimated_selectivity(&self) -> f64 {
        base_rate::UNKNOWN
    }

    fn remap_columns(&self, f: &dyn Fn(usize) -> usize) -> std::sync::Arc<dyn ColumnPredicate> {
        std::sync::Arc::new(Self { column: f(self.column) })
    }
}

#[derive(Debug)]
pub struct IsNotNullPredicate {
    column: usize,
}

impl IsNotNullPredicate {
    pub fn new(column: usize) -> Self {
        Self { column }
    }
}

impl ColumnPredicate for IsNotNullPredicate {
    fn column_index(&self) -> Option<usize> {
        Some(self.column)
    }

    fn evaluate(
        &self,
        store: &dyn ColumnStore,
        bitmap: &mut SelectionBitmap,
        range: Range<usize>,
    ) -> Result<()> {
        let col = store.column(self.column);
        for i in range {
            if col.array.is_null(i) {
                bitmap.clear(i);
            }
        }
        Ok(())
    }

    fn may_contain_matches(&self, summary: &ChunkSummary) -> bool {
        // An all-null chunk can never satisfy IsNotNull.
        !summary.all_null
    }

    fn estimated_selectivity(&self) -> f64 {
        1.0 - base_rate::UNKNOWN
    }

    fn remap_columns(&self, f: &dyn Fn(usize) -> usize) -> std::sync::Arc<dyn ColumnPredicate> {
        std::sync::Arc::new(Self { column: f(self.column) })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolTest {
    IsTrue,
    IsFalse,
    IsNull,
}

#[derive(Debug)]
pub struct BooleanPredicate {
    column: usize,
    test: BoolTest,
}

impl BooleanPredicate {
    pub fn new(column: usize, test: BoolTest) -> Self {
        Self { column, test }
    }
}

impl ColumnPredicate for BooleanPredicate {
    fn column_index(&self) -> Option<usize> {
        Some(self.column)
    }

    fn evaluate(
        &self,
        store: &dyn ColumnStore,
        bitmap: &mut SelectionBitmap,
        range: Range<usize>,
    ) -> Result<()> {
        let col = store.column(self.column);
        let arr = col.array.as_any().downcast_ref::<BooleanArray>().unwrap();
        match self.test {
            BoolTest::IsNull => {
                for i in range {
                    if !arr.is_null(i) {
                        bitmap.clear(i);
                    }
                }
            }
            BoolTest::IsTrue => {
                for i in range {
                    if arr.is_null(i) || !arr.value(i) {
                        bitmap.clear(i);
                    }
                }
            }
            BoolTest::IsFalse => {
                for i in range {
                    if arr.is_null(i) || arr.value(i) {
                        bitmap.clear(i);
                    }
                }
            }
        }
        Ok(())
    }

    fn may_contain_matches(&self, _summary: &ChunkSummary) -> bool {
        // No zone map for boolean columns; the optimizer assumes absence.
        true
    }

    fn estimated_selectivity(&self) -> f64 {
        match self.test {
            BoolTest::IsTrue => base_rate::BOOL_TRUE,
            BoolTest::IsFalse => base_rate::BOOL_FALSE,
            BoolTest::IsNull => base_rate::UNKNOWN,
        }
    }

    fn remap_columns(&self, f: &dyn Fn(usize) -> usize) -> std::sync::Arc<dyn ColumnPredicate> {
        std::sync::Arc::new(Self {
            column: f(self.column),
            test: self.test,
        })
    }
}

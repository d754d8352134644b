//! String predicates: equality, prefix/suffix/substring tests.
//!
//! Dictionary-encoded columns get the optimization the design calls out
//! explicitly: equality first resolves the constant against the
//! dictionary once (`O(|dict|)`), then becomes an index comparison, never
//! touching the value buffer per row. A constant absent from the
//! dictionary short-circuits to the empty result with no per-row work at
//! all.

use std::ops::Range;

use arrow_array::{Array, StringArray};

use crate::bitmap::SelectionBitmap;
use crate::error::{EngineError, Result};
use crate::schema::{ColumnStore, LogicalType};
use crate::zonemap::ChunkSummary;

use super::{base_rate, ColumnPredicate, FastPath};

fn require_utf8(logical_type: LogicalType) -> Result<()> {
    if logical_type != LogicalType::Utf8 {
        return Err(EngineError::PredicateTypeMismatch(format!(
            "string predicate built against non-string column type {logical_type:?}"
        )));
    }
    Ok(())
}

#[derive(Debug)]
pub struct StringEqualityPredicate {
    column: usize,
    constant: String,
}

impl StringEqualityPredicate {
    pub fn try_new(column: usize, logical_type: LogicalType, constant: String) -> Result<Self> {
        require_utf8(logical_type)?;
        Ok(Self { column, constant })
    }
}

impl ColumnPredicate for StringEqualityPredicate {
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
        bitmap.and_with_validity_bitmap(col.validity_bitmap_bytes());

        if let Some((indices, values)) = store.dictionary_of(self.column) {
            let values = values.as_any().downcast_ref::<StringArray>().unwrap();
            let mut matching_index = None;
            for i in 0..values.len() {
                if !values.is_null(i) && values.value(i) == self.constant {
                    matching_index = Some(i as i32);
                    break;
                }
            }
            let Some(target) = matching_index else {
                // Constant isn't in the dictionary at all: empty result,
                // zero per-row work.
                bitmap.clear_range(range.start, range.end);
                return Ok(());
            };
            let indices = indices.as_any().downcast_ref::<arrow_array::Int32Array>().unwrap();
            for i in range {
                if indices.is_null(i) || indices.value(i) != target {
                    bitmap.clear(i);
                }
            }
            return Ok(());
        }

        let arr = col.array.as_any().downcast_ref::<StringArray>().unwrap();
        for i in range {
            if arr.is_null(i) || arr.value(i) != self.constant {
                bitmap.clear(i);
            }
        }
        Ok(())
    }

    fn may_contain_matches(&self, _summary: &ChunkSummary) -> bool {
        // No zone map is built for string columns; the optimizer assumes
        // their absence rather than synthesizing a min/max over strings.
        true
    }

    fn estimated_selectivity(&self) -> f64 {
        base_rate::EQUALITY
    }

    fn fast_path(&self) -> Option<FastPath<'_>> {
        Some(FastPath::StringEq {
            column: self.column,
            constant: &self.constant,
        })
    }

    fn remap_columns(&self, f: &dyn Fn(usize) -> usize) -> std::sync::Arc<dyn ColumnPredicate> {
        std::sync::Arc::new(Self {
            column: f(self.column),
            constant: self.constant.clone(),
        })
    }
}

macro_rules! string_test_predicate {
    ($name:ident, $doc:literal, $test:expr) => {
        #[doc = $doc]
        #[derive(Debug)]
        pub struct $name {
            column: usize,
            pattern: String,
        }

        impl $name {
            pub fn try_new(column: usize, logical_type: LogicalType, pattern: String) -> Result<Self> {
                require_utf8(logical_type)?;
                Ok(Self { column, pattern })
            }
        }

        impl ColumnPredicate for $name {
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
                bitmap.and_with_validity_bitmap(col.validity_bitmap_bytes());
                let arr = col.array.as_any().downcast_ref::<StringArray>().unwrap();
                let test: fn(&str, &str) -> bool = $test;
                for i in range {
                    if arr.is_null(i) || !test(arr.value(i), &self.pattern) {
                        bitmap.clear(i);
                    }
                }
                Ok(())
            }

            fn may_contain_matches(&self, _summary: &ChunkSummary) -> bool {
                true
            }

            fn estimated_selectivity(&self) -> f64 {
                base_rate::RANGE
            }

            fn remap_columns(&self, f: &dyn Fn(usize) -> usize) -> std::sync::Arc<dyn ColumnPredicate> {
                std::sync::Arc::new(Self {
                    column: f(self.column),
                    pattern: self.pattern.clone(),
                })
            }
        }
    };
}

string_test_predicate!(
    StringStartsWithPredicate,
    "True when the column value starts with the predicate's pattern.",
    |value, pattern| value.starts_with(pattern)
);
string_test_predicate!(
    StringEndsWithPredicate,
    "True when the column value ends with the predicate's pattern.",
    |value, pattern| value.ends_with(pattern)
);
string_test_predicate!(
    StringContainsPredicate,
    "True when the column value contains the predicate's pattern as a substring.",
    |value, pattern| value.contains(pattern)
);

//! Boolean composition over column predicates: AND, OR, NOT.
//!
//! Compound predicates have no single bound column — `column_index`
//! returns `None` and the optimizer's per-column reordering only applies
//! to their children, in order.

use std::ops::Range;
use std::sync::Arc;

use crate::bitmap::{Initial, SelectionBitmap};
use crate::error::Result;
use crate::schema::ColumnStore;
use crate::zonemap::ChunkSummary;

use super::ColumnPredicate;

#[derive(Debug)]
pub struct AndPredicate {
    children: Vec<Arc<dyn ColumnPredicate>>,
}

impl AndPredicate {
    pub fn new(children: Vec<Arc<dyn ColumnPredicate>>) -> Self {
        Self { children }
    }

    pub fn children(&self) -> &[Arc<dyn ColumnPredicate>] {
        &self.children
    }
}

impl ColumnPredicate for AndPredicate {
    fn column_index(&self) -> Option<usize> {
        None
    }

    fn evaluate(
        &self,
        store: &dyn ColumnStore,
        bitmap: &mut SelectionBitmap,
        range: Range<usize>,
    ) -> Result<()> {
        // Each child only narrows the set; applying them in the caller's
        // order (already selectivity-sorted by the optimizer) is what
        // makes short-circuiting via an early-empty bitmap worthwhile.
        for child in &self.children {
            if bitmap.count_set() == 0 {
                break;
            }
            child.evaluate(store, bitmap, range.clone())?;
        }
        Ok(())
    }

    fn may_contain_matches(&self, summary: &ChunkSummary) -> bool {
        self.children.iter().all(|c| c.may_contain_matches(summary))
    }

    fn estimated_selectivity(&self) -> f64 {
        self.children
            .iter()
            .map(|c| c.estimated_selectivity())
            .product()
    }

    fn remap_columns(&self, f: &dyn Fn(usize) -> usize) -> Arc<dyn ColumnPredicate> {
        Arc::new(Self::new(self.children.iter().map(|c| c.remap_columns(f)).collect()))
    }
}

#[derive(Debug)]
pub struct OrPredicate {
    children: Vec<Arc<dyn ColumnPredicate>>,
}

impl OrPredicate {
    pub fn new(children: Vec<Arc<dyn ColumnPredicate>>) -> Self {
        Self { children }
    }

    pub fn children(&self) -> &[Arc<dyn ColumnPredicate>] {
        &self.children
    }
}

impl ColumnPredicate for OrPredicate {
    fn column_index(&self) -> Option<usize> {
        None
    }

    fn evaluate(
        &self,
        store: &dyn ColumnStore,
        bitmap: &mut SelectionBitmap,
        range: Range<usize>,
    ) -> Result<()> {
        // Union: every child gets its own bitmap scoped to the same
        // range, starting from full selection minus what the caller
        // already excluded, then OR'd back in.
        let len = bitmap.len();
        let mut accumulated = SelectionBitmap::new(len, Initial::AllZero);
        for child in &self.children {
            let mut candidate = bitmap.clone();
            child.evaluate(store, &mut candidate, range.clone())?;
            accumulated.or(&candidate);
        }
        bitmap.and(&accumulated);
        Ok(())
    }

    fn may_contain_matches(&self, summary: &ChunkSummary) -> bool {
        self.children.iter().any(|c| c.may_contain_matches(summary))
    }

    fn estimated_selectivity(&self) -> f64 {
        let mut none_rate = 1.0;
        for c in &self.children {
            none_rate *= 1.0 - c.estimated_selectivity();
        }
        (1.0 - none_rate).clamp(0.0, 1.0)
    }

    fn remap_columns(&self, f: &dyn Fn(usize) -> usize) -> Arc<dyn ColumnPredicate> {
        Arc::new(Self::new(self.children.iter().map(|c| c.remap_columns(f)).collect()))
    }
}

#[derive(Debug)]
pub struct NotPredicate {
    child: Arc<dyn ColumnPredicate>,
}

impl NotPredicate {
    pub fn new(child: Arc<dyn ColumnPredicate>) -> Self {
        Self { child }
    }

    pub fn child(&self) -> &Arc<dyn ColumnPredicate> {
        &self.child
    }
}

impl ColumnPredicate for NotPredicate {
    fn column_index(&self) -> Option<usize> {
        None
    }

    fn evaluate(
        &self,
        store: &dyn ColumnStore,
        bitmap: &mut SelectionBitmap,
        range: Range<usize>,
    ) -> Result<()> {
        // Scoped to `range`, the same way `OrPredicate` seeds its
        // candidate from `bitmap`: rows outside `range` must pass through
        // untouched, so a bitmap-wide `not()` (which would also flip
        // every word outside this chunk) is not an option here. Evaluate
        // the child into a clone; it only clears bits within `range`, so
        // a bit still set there means the original row was live *and*
        // the child matched it — clear exactly those.
        let mut candidate = bitmap.clone();
        self.child.evaluate(store, &mut candidate, range.clone())?;
        for i in range {
            if candidate.get(i) {
                bitmap.clear(i);
            }
        }
        Ok(())
    }

    fn may_contain_matches(&self, _summary: &ChunkSummary) -> bool {
        // Negation of a chunk-skippable predicate is not itself
        // chunk-skippable from a min/max summary alone; always scan.
        true
    }

    fn estimated_selectivity(&self) -> f64 {
        (1.0 - self.child.estimated_selectivity()).clamp(0.0, 1.0)
    }

    fn remap_columns(&self, f: &dyn Fn(usize) -> usize) -> Arc<dyn ColumnPredicate> {
        Arc::new(Self::new(self.child.remap_columns(f)))
    }
}

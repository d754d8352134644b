//! The selection bitmap: the primary intermediate row-set representation.
//!
//! Packed 64-bit words, one bit per row position. Bits at positions ≥ the
//! logical length `L` within the last word are kept at 0 by every mutating
//! operation that could touch them — `count_set` and `not` both rely on
//! that invariant, so it is enforced at the single choke point
//! `mask_tail` rather than re-derived at each call site.

use std::sync::Arc;

use parking_lot::Mutex;

const BITS_PER_WORD: usize = 64;

#[inline]
fn word_count(len: usize) -> usize {
    (len + BITS_PER_WORD - 1) / BITS_PER_WORD
}

/// Which bit pattern a freshly created bitmap starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initial {
    AllZero,
    AllOne,
}

/// A packed bitset of row positions, length `len` (in bits) rounded up to
/// a whole number of 64-bit words for storage.
#[derive(Debug, Clone)]
pub struct SelectionBitmap {
    words: Vec<u64>,
    len: usize,
}

impl SelectionBitmap {
    pub fn new(len: usize, initial: Initial) -> Self {
        let nwords = word_count(len);
        let fill = match initial {
            Initial::AllZero => 0u64,
            Initial::AllOne => u64::MAX,
        };
        let mut words = vec![fill; nwords];
        mask_tail(&mut words, len);
        Self { words, len }
    }

    /// Builds from pre-populated words, re-masking the tail defensively.
    pub fn from_words(mut words: Vec<u64>, len: usize) -> Self {
        debug_assert_eq!(words.len(), word_count(len));
        mask_tail(&mut words, len);
        Self { words, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn words_mut(&mut self) -> &mut [u64] {
        &mut self.words
    }

    #[inline]
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len, "bitmap index {i} out of range {}", self.len);
        (self.words[i >> 6] >> (i & 63)) & 1 == 1
    }

    #[inline]
    pub fn set(&mut self, i: usize) {
        debug_assert!(i < self.len, "bitmap index {i} out of range {}", self.len);
        self.words[i >> 6] |= 1u64 << (i & 63);
    }

    #[inline]
    pub fn clear(&mut self, i: usize) {
        debug_assert!(i < self.len, "bitmap index {i} out of range {}", self.len);
        self.words[i >> 6] &= !(1u64 << (i & 63));
    }

    /// Clears every bit in `[s, e)`. Used to drop a whole chunk that a
    /// zone map proved cannot match.
    pub fn clear_range(&mut self, s: usize, e: usize) {
        debug_assert!(e <= self.len);
        for i in s..e {
            self.clear(i);
        }
    }

    /// Popcount over live bits only; the tail is always masked so padding
    /// bits never contribute.
    pub fn count_set(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }

    /// In-place bitwise AND with another bitmap of equal length.
    pub fn and(&mut self, other: &SelectionBitmap) {
        debug_assert_eq!(self.len, other.len);
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a &= *b;
        }
    }

    /// In-place bitwise OR with another bitmap of equal length.
    pub fn or(&mut self, other: &SelectionBitmap) {
        debug_assert_eq!(self.len, other.len);
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= *b;
        }
    }

    /// In-place bitwise NOT, truncating the last word's padding bits back to 0.
    pub fn not(&mut self) {
        for w in self.words.iter_mut() {
            *w = !*w;
        }
        mask_tail(&mut self.words, self.len);
    }

    /// Converts Arrow's byte-oriented, LSB-first validity layout into
    /// words and bulk-ANDs it into this bitmap in one pass. A `None`
    /// validity bitmap (no nulls) is a no-op.
    pub fn and_with_validity_bitmap(&mut self, validity: Option<&[u8]>) {
        let Some(bytes) = validity else { return };
        let mut i = 0usize;
        while i < self.len {
            let word_idx = i >> 6;
            let mut word = 0u64;
            let bits_here = BITS_PER_WORD.min(self.len - i);
            for b in 0..bits_here {
                let bit_pos = i + b;
                let byte = bytes[bit_pos >> 3];
                if (byte >> (bit_pos & 7)) & 1 == 1 {
                    word |= 1u64 << b;
                }
            }
            self.words[word_idx] &= word;
            i += BITS_PER_WORD;
        }
    }

    /// Enumerates set bit positions in ascending order. Cost is
    /// proportional to the popcount, not to `len`: each word is skipped
    /// entirely when zero, and trailing-zero-count jumps straight to each
    /// set bit within a non-zero word.
    pub fn get_selected_indices(&self) -> Vec<u64> {
        let mut out = Vec::with_capacity(self.count_set() as usize);
        for (word_idx, &word) in self.words.iter().enumerate() {
            let mut w = word;
            while w != 0 {
                let bit = w.trailing_zeros() as usize;
                out.push((word_idx * BITS_PER_WORD + bit) as u64);
                w &= w - 1; // clear lowest set bit
            }
        }
        out
    }

    /// Visits each set bit without allocating the full index vector — the
    /// enumeration kernel `get_selected_indices` reduces to, used by
    /// materialization and aggregation.
    pub fn for_each_set<F: FnMut(usize)>(&self, mut f: F) {
        for (word_idx, &word) in self.words.iter().enumerate() {
            let mut w = word;
            while w != 0 {
                let bit = w.trailing_zeros() as usize;
                f(word_idx * BITS_PER_WORD + bit);
                w &= w - 1;
            }
        }
    }
}

fn mask_tail(words: &mut [u64], len: usize) {
    if len == 0 {
        words.fill(0);
        return;
    }
    let used_bits = len % BITS_PER_WORD;
    if used_bits != 0 {
        if let Some(last) = words.last_mut() {
            *last &= (1u64 << used_bits) - 1;
        }
    }
}

/// A scoped, pooled allocation of `SelectionBitmap` backing storage.
/// Acquire once per query chunk, release on every exit path (including
/// panics, via `Drop`) so the pool's footprint stays bounded across
/// concurrently running queries.
pub struct BitmapPool {
    free: Mutex<Vec<Vec<u64>>>,
}

impl BitmapPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::new()),
        })
    }

    pub fn acquire(self: &Arc<Self>, len: usize, initial: Initial) -> PooledBitmap {
        let nwords = word_count(len);
        let mut words = {
            let mut free = self.free.lock();
            free.pop().unwrap_or_default()
        };
        words.clear();
        let fill = match initial {
            Initial::AllZero => 0u64,
            Initial::AllOne => u64::MAX,
        };
        words.resize(nwords, fill);
        mask_tail(&mut words, len);
        PooledBitmap {
            pool: self.clone(),
            bitmap: Some(SelectionBitmap { words, len }),
        }
    }
}

/// Guard returned by `BitmapPool::acquire`. Its backing `Vec<u64>` is
/// returned to the pool on drop along every exit path, including an early
/// `?` return or a panic unwind.
pub struct PooledBitmap {
    pool: Arc<BitmapPool>,
    bitmap: Option<SelectionBitmap>,
}

impl std::ops::Deref for PooledBitmap {
    type Target = SelectionBitmap;
    fn deref(&self) -> &SelectionBitmap {
        self.bitmap.as_ref().expect("bitmap taken before drop")
    }
}

impl std::ops::DerefMut for PooledBitmap {
    fn deref_mut(&mut self) -> &mut SelectionBitmap {
        self.bitmap.as_mut().expect("bitmap taken before drop")
    }
}

impl Drop for PooledBitmap {
    fn drop(&mut self) {
        if let Some(bitmap) = self.bitmap.take() {
            let mut words = bitmap.words;
            words.clear();
            self.pool.free.lock().push(words);
        }
    }
}

//! # Free-List Bitmap
//!
//! Tracks which indices of a dense range `[0, N)` are in use, 64 at a time.
//!
//! ## Layout
//!
//! ```text
//! word 0                word 1                word 2
//! [1 0 0 1 ... 0 0 0]   [0 0 0 0 ... 0 1 0]   [1 1 1 1 ... 1 1 1]
//!  ^ first_free                        ^ alloc_end-1      (trailing words
//!                                                          get truncated)
//! ```
//!
//! A set bit means free, a cleared bit means allocated. Two caches keep the
//! common paths O(1) amortized:
//! - `first_free`: lowest free index, the next one `alloc` hands out
//! - `alloc_end`: one past the highest allocated index, so owners know when
//!   their trailing memory can be released
//!
//! Indices at or beyond `words.len() * 64` are implicitly free.

/// Slots per bitmap word.
pub const WORD_BITS: usize = 64;

const ALL_FREE: u64 = !0;

/// Index of the lowest free (set) bit in `words[start_word..]`.
///
/// Returns `words.len() * 64` if every scanned word is fully allocated: the
/// bitmap has to grow, and the next free index is exactly the first bit of
/// the new word.
#[inline]
#[must_use]
pub fn scan_forward_free(words: &[u64], start_word: usize) -> usize {
    words
        .iter()
        .enumerate()
        .skip(start_word)
        .find(|(_, &word)| word != 0)
        .map_or(words.len() * WORD_BITS, |(i, &word)| {
            i * WORD_BITS + word.trailing_zeros() as usize
        })
}

/// One past the index of the highest allocated (cleared) bit in
/// `words[..=start_word]`.
///
/// Returns 0 if every scanned word is fully free: everything can be released.
///
/// # Panics
///
/// Panics if `start_word` is out of bounds.
#[inline]
#[must_use]
pub fn scan_reverse_allocated(words: &[u64], start_word: usize) -> usize {
    words[..=start_word]
        .iter()
        .enumerate()
        .rev()
        .find(|(_, &word)| word != ALL_FREE)
        .map_or(0, |(i, &word)| {
            let highest = WORD_BITS - 1 - (!word).leading_zeros() as usize;
            i * WORD_BITS + highest + 1
        })
}

#[inline]
const fn locate(idx: usize) -> (usize, u64) {
    (idx / WORD_BITS, 1 << (idx % WORD_BITS))
}

/// Growable bitmap of free/allocated slots with cached scan positions.
///
/// # Example
///
/// ```rust,ignore
/// let mut bits = FreeListBitmap::new();
/// let a = bits.alloc(); // 0
/// let b = bits.alloc(); // 1
/// bits.free(a);
/// assert_eq!(bits.alloc(), 0); // lowest free index is reused first
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FreeListBitmap {
    /// Bit `i` set means slot `i` is free.
    words: Vec<u64>,
    /// Lowest free index. May equal `words.len() * 64`.
    first_free: usize,
    /// One past the highest allocated index, 0 when empty.
    alloc_end: usize,
}

impl FreeListBitmap {
    /// Creates an empty bitmap. Does not allocate.
    #[must_use]
    pub const fn new() -> Self {
        Self { words: Vec::new(), first_free: 0, alloc_end: 0 }
    }

    /// Creates an empty bitmap with room for `slots` slots before the word
    /// array reallocates.
    #[must_use]
    pub fn with_capacity(slots: usize) -> Self {
        Self { words: Vec::with_capacity(slots.div_ceil(WORD_BITS)), first_free: 0, alloc_end: 0 }
    }

    /// Allocates the lowest free index.
    ///
    /// # Panics
    ///
    /// Panics if the `u32` index space is exhausted, or if the cached
    /// `first_free` slot turns out to be allocated (a corrupted bitmap).
    pub fn alloc(&mut self) -> u32 {
        let idx = self.first_free;
        let Ok(handle) = u32::try_from(idx) else {
            panic!("bitmap index space exhausted at {idx}");
        };

        // Allocation always takes the lowest free slot, so the array only
        // ever grows by one word, exactly when that slot is past the end.
        if idx == self.words.len() * WORD_BITS {
            self.words.push(ALL_FREE);
        }

        let (word, mask) = locate(idx);
        assert!(self.words[word] & mask != 0, "slot {idx} is already allocated");
        self.words[word] &= !mask;

        // Nothing below the old first_free can have become free.
        self.first_free = scan_forward_free(&self.words, word);
        self.alloc_end = self.alloc_end.max(idx + 1);

        handle
    }

    /// Frees `idx`. Freeing an already free slot below `alloc_end` is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is at or above `alloc_end`: such an index was never
    /// handed out, or the whole tail it belonged to was already released.
    pub fn free(&mut self, idx: u32) {
        let idx = idx as usize;
        assert!(idx < self.alloc_end, "free of slot {idx} at or above alloc_end {}", self.alloc_end);

        let (word, mask) = locate(idx);
        self.words[word] |= mask;

        if idx == self.alloc_end - 1 {
            self.alloc_end = scan_reverse_allocated(&self.words, word);
            self.words.truncate(self.alloc_end.div_ceil(WORD_BITS));
        }

        self.first_free = self.first_free.min(idx);
    }

    /// Whether `idx` is free. Indices past the word array are free.
    #[inline]
    #[must_use]
    pub fn is_free(&self, idx: u32) -> bool {
        let (word, mask) = locate(idx as usize);
        self.words.get(word).map_or(true, |&bits| bits & mask != 0)
    }

    /// Whether `idx` is currently allocated.
    #[inline]
    #[must_use]
    pub fn is_allocated(&self, idx: u32) -> bool {
        !self.is_free(idx)
    }

    /// Lowest free index, the one the next [`alloc`](Self::alloc) returns.
    #[inline]
    #[must_use]
    pub const fn first_free(&self) -> usize {
        self.first_free
    }

    /// One past the highest allocated index, or 0 if nothing is allocated.
    #[inline]
    #[must_use]
    pub const fn alloc_end(&self) -> usize {
        self.alloc_end
    }

    /// Number of 64-bit words currently stored.
    #[inline]
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Raw words, bit set = free.
    #[inline]
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Number of allocated slots. O(words).
    #[must_use]
    pub fn count_allocated(&self) -> usize {
        self.words.iter().map(|word| word.count_zeros() as usize).sum()
    }

    /// Iterates allocated indices in ascending order.
    pub fn iter_allocated(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            SetBits(!word).map(move |bit| (i * WORD_BITS + bit) as u32)
        })
    }

    /// Frees every slot and drops the word array's contents.
    pub fn clear(&mut self) {
        self.words.clear();
        self.first_free = 0;
        self.alloc_end = 0;
    }

    /// Checks both caches and the word-array length against a full scan.
    ///
    /// O(N); meant for tests and debugging.
    ///
    /// # Panics
    ///
    /// Panics with a description of the first broken invariant.
    pub fn check_invariants(&self) {
        let len = self.words.len() * WORD_BITS;
        let free = |idx: usize| idx >= len || self.words[idx / WORD_BITS] & (1 << (idx % WORD_BITS)) != 0;

        assert!(self.first_free <= len, "first_free {} past end {len}", self.first_free);
        assert!(free(self.first_free), "first_free {} is allocated", self.first_free);
        if let Some(idx) = (0..self.first_free).find(|&idx| free(idx)) {
            panic!("slot {idx} below first_free {} is free", self.first_free);
        }

        assert!(self.alloc_end <= len, "alloc_end {} past end {len}", self.alloc_end);
        if self.alloc_end > 0 {
            assert!(!free(self.alloc_end - 1), "alloc_end-1 {} is free", self.alloc_end - 1);
        }
        if let Some(idx) = (self.alloc_end..len).find(|&idx| !free(idx)) {
            panic!("slot {idx} at or above alloc_end {} is allocated", self.alloc_end);
        }
    }
}

/// Iterator over the set bits of a word, lowest first.
struct SetBits(u64);

impl Iterator for SetBits {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }
        let bit = self.0.trailing_zeros() as usize;
        self.0 &= self.0 - 1;
        Some(bit)
    }
}

//! Broadcast min-heap.
//!
//! A min-heap of `(id, value)` pairs augmented with [`BroadcastHeap::add_all`],
//! which shifts the value of every stored element in O(1) by folding the
//! delta into a single lazy offset. Stored keys are `value - offset`, so the
//! externally visible value of an element is always `key + offset` and a
//! push after any number of shifts still lands at its requested value.
//!
//! # Key Concepts
//!
//! The epoch algorithm repeatedly walks a group of candidates whose
//! remaining-block counters all shrink by the same step. Decrementing each
//! element individually costs O(k log k) per step; shifting the offset costs
//! O(1) and leaves the heap order untouched, since every key moves by the
//! same amount.
//!
//! Ties between equal values break on the lower id, so extraction order is
//! deterministic for any insertion order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Min-heap with an O(1) add-to-all operation.
///
/// # Examples
///
/// ```rust
/// use karma_alloc::heap::BroadcastHeap;
///
/// let mut heap = BroadcastHeap::new();
/// heap.push(1, 10);
/// heap.push(2, 4);
/// heap.add_all(-3);
///
/// assert_eq!(heap.min(), Some(1));
/// assert_eq!(heap.pop(), Some((2, 1)));
/// assert_eq!(heap.pop(), Some((1, 7)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct BroadcastHeap {
    heap: BinaryHeap<Reverse<(i64, u32)>>,
    offset: i64,
}

impl BroadcastHeap {
    /// Create an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `id` with external value `value`.
    pub fn push(&mut self, id: u32, value: u64) {
        self.heap.push(Reverse((value as i64 - self.offset, id)));
    }

    /// Smallest external value, or `None` when empty.
    pub fn min(&self) -> Option<u64> {
        self.heap
            .peek()
            .map(|&Reverse((key, _))| (key + self.offset) as u64)
    }

    /// Remove and return the element with the smallest external value.
    ///
    /// Ties break on the lower id.
    pub fn pop(&mut self) -> Option<(u32, u64)> {
        self.heap
            .pop()
            .map(|Reverse((key, id))| (id, (key + self.offset) as u64))
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Check whether the heap is empty.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Add `delta` to the external value of every stored element.
    ///
    /// O(1): subsequent pushes compensate for the shifted offset.
    pub fn add_all(&mut self, delta: i64) {
        self.offset += delta;
    }
}

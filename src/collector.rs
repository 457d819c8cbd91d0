//! Bounded top-k candidate collection.
//!
//! The same structure serves every pipeline stage: widened capacity during
//! the approximate scan, capacity `k` for the final result, and the merge of
//! per-worker partials. Internally a max-heap keyed on (distance, id), so the
//! current worst retained candidate is always at the top.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

/// One scored base vector.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Candidate {
    pub distance: f32,
    pub id: u32,
}

/// Padding entry for fixed-size result batches. Collectors ignore it; merge
/// logic must never treat it as a real low-priority candidate.
pub const NO_CANDIDATE: Candidate = Candidate {
    distance: f32::INFINITY,
    id: u32::MAX,
};

impl Candidate {
    #[inline]
    pub fn new(distance: f32, id: u32) -> Self {
        Self { distance, id }
    }

    /// True for the padding sentinel.
    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.id == u32::MAX && self.distance.is_infinite()
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    /// Orders by distance; equal distances break toward the smaller id, so
    /// collection contents are insertion-order independent.
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Bounded collection of the smallest-distance candidates seen so far.
#[derive(Clone, Debug)]
pub struct TopK {
    heap: BinaryHeap<Candidate>,
    capacity: usize,
}

impl TopK {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity.saturating_add(1)),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Largest retained (distance, id), or `None` while below capacity.
    /// O(1).
    #[inline]
    pub fn worst(&self) -> Option<Candidate> {
        self.heap.peek().copied()
    }

    /// Considers one candidate. Admits while below capacity; afterwards a
    /// candidate only displaces the current worst if it orders strictly
    /// below it. Sentinels are dropped outright.
    #[inline]
    pub fn offer(&mut self, candidate: Candidate) {
        if candidate.is_sentinel() || self.capacity == 0 {
            return;
        }
        if self.heap.len() < self.capacity {
            self.heap.push(candidate);
        } else if candidate < *self.heap.peek().unwrap() {
            self.heap.pop();
            self.heap.push(candidate);
        }
    }

    /// Offers every candidate of another collector. The retained set is the
    /// same whichever order collectors are merged in.
    pub fn merge(&mut self, other: TopK) {
        for candidate in other.heap {
            self.offer(candidate);
        }
    }

    /// Consumes the collector, returning candidates ascending by
    /// (distance, id).
    pub fn drain(self) -> Vec<Candidate> {
        let mut out = self.heap.into_vec();
        out.sort_unstable();
        out
    }
}

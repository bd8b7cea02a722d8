//! List types used by the pitch path: a sorted candidate list and a bounded
//! growable list of distinctive candidates.

use crate::core::base::{Error, Res};

/// Hard ceiling on the growth of [`BoundedList`].
pub const MAX_LIST_CAPACITY: usize = 10_000;

/// Index of the leftmost value in `l` greater than or equal to `value`.
///
/// Mirrors Python's `bisect_left` over a sorted slice.
pub fn bisect_left(l: &[f32], value: f32) -> usize {
    let mut low = 0;
    let mut high = l.len();
    while low < high {
        let mid = (low + high) / 2;
        if l[mid] < value {
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    low
}

/// Sorted (ascending) list of `f32` with a fixed capacity.
///
/// Ties keep insertion order: an equal value is inserted before the first
/// entry that is greater than or equal to it, shifting the rest right.
#[derive(Debug, Clone)]
pub struct OrderedList {
    array: Vec<f32>,
    capacity: usize,
}

impl OrderedList {
    /// Creates an empty list able to hold `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            array: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.array
    }

    /// Index of the leftmost entry greater than or equal to `value`.
    pub fn bisect(&self, value: f32) -> usize {
        bisect_left(&self.array, value)
    }

    /// Inserts `value`, keeping the list sorted.
    pub fn insert(&mut self, value: f32) -> Res<()> {
        if self.array.len() == self.capacity {
            return Err(Error::CapacityExceeded);
        }
        let index = self.bisect(value);
        self.array.insert(index, value);
        Ok(())
    }

    /// Deletes the entries with indices `start..stop`.
    pub fn delete_range(&mut self, start: usize, stop: usize) {
        if start >= stop {
            return;
        }
        self.array.drain(start..stop.min(self.array.len()));
    }
}

/// One distinctive fundamental-frequency candidate for a frame.
///
/// `prev_index` is an integer offset into the previous frame's candidate
/// list; `-1` means "no predecessor".  The path-selection trace-back walks
/// these offsets instead of holding references.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistinctCandidate {
    pub frequency: f32,
    pub confidence: i32,
    pub cost: f32,
    pub prev_index: i32,
}

/// Growable list with doubling growth and a declared maximum capacity.
///
/// Exceeding [`MAX_LIST_CAPACITY`] (or a smaller declared maximum) fails
/// with [`Error::CapacityExceeded`] rather than growing without bound.
#[derive(Debug, Clone)]
pub struct BoundedList<T> {
    items: Vec<T>,
    max_capacity: usize,
}

impl<T> BoundedList<T> {
    /// Creates an empty list.  A `max_capacity` of 0 (or anything above the
    /// hard ceiling) selects [`MAX_LIST_CAPACITY`].
    pub fn new(capacity: usize, max_capacity: usize) -> Self {
        let max_capacity = if max_capacity == 0 || max_capacity > MAX_LIST_CAPACITY {
            MAX_LIST_CAPACITY
        } else {
            max_capacity
        };
        Self {
            items: Vec::with_capacity(capacity.min(max_capacity)),
            max_capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn get(&self, index: usize) -> &T {
        &self.items[index]
    }

    /// Appends `val`, doubling the backing storage as needed up to the
    /// declared maximum.
    pub fn append(&mut self, val: T) -> Res<()> {
        if self.items.len() == self.max_capacity {
            return Err(Error::CapacityExceeded);
        }
        if self.items.len() == self.items.capacity() {
            let doubled = (self.items.capacity().max(1) * 2).min(self.max_capacity);
            self.items.reserve_exact(doubled - self.items.len());
        }
        self.items.push(val);
        Ok(())
    }

    /// Drops the last `n` entries (used by the transient tail heuristic).
    pub fn truncate_by(&mut self, n: usize) {
        let keep = self.items.len().saturating_sub(n);
        self.items.truncate(keep);
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

/// Distinctive candidates for one frame, in insertion order.
pub type DistinctList = BoundedList<DistinctCandidate>;

impl DistinctList {
    /// Updates the running cost and predecessor of the candidate at `index`.
    pub fn adjust_cost(&mut self, index: usize, cost: f32, prev_index: i32) {
        let cand = &mut self.items[index];
        cand.cost = cost;
        cand.prev_index = prev_index;
    }
}

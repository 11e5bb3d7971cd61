//! A fixed-capacity accumulator that keeps the `k` best scored entries seen so far.
//!
//! Entries are ranked by score, then by insertion order: among equal scores the
//! earlier entry ranks higher. A new entry is admitted only if it scores strictly
//! above the current minimum (empty slots count as `-inf`), and whatever it
//! displaces is handed back to the caller.

use std::{cmp::Ordering, collections::BinaryHeap};

/// The outcome of offering an entry to a [`TopK`].
#[derive(Debug, PartialEq, Eq)]
pub enum Offer<T> {
    /// The entry took an empty slot.
    Inserted,
    /// The entry displaced the weakest one, which is returned.
    Replaced(T),
    /// The entry did not beat the weakest one and is returned unchanged.
    Rejected(T),
}

#[derive(Debug)]
struct Slot<T> {
    score: f32,
    order: u64,
    item: T,
}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Slot<T> {}

impl<T> PartialOrd for Slot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Slot<T> {
    // "greater" means weaker, so the heap top is the next entry to evict
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then(self.order.cmp(&other.order))
    }
}

#[derive(Debug)]
pub struct TopK<T> {
    capacity: usize,
    counter: u64,
    heap: BinaryHeap<Slot<T>>,
}

impl<T> TopK<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            counter: 0,
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The score an entry has to beat to be admitted.
    pub fn threshold(&self) -> f32 {
        match self.heap.len() < self.capacity {
            true => f32::NEG_INFINITY,
            false => self.heap.peek().map_or(f32::INFINITY, |slot| slot.score),
        }
    }

    pub fn offer(&mut self, score: f32, item: T) -> Offer<T> {
        // NaN never compares greater, so it is rejected here as well
        if score.partial_cmp(&self.threshold()) != Some(Ordering::Greater) {
            return Offer::Rejected(item);
        }

        let order = self.counter;
        self.counter += 1;
        let slot = Slot { score, order, item };

        if self.heap.len() < self.capacity {
            self.heap.push(slot);
            return Offer::Inserted;
        }

        match self.heap.peek_mut() {
            Some(mut weakest) => {
                let evicted = std::mem::replace(&mut *weakest, slot);
                // dropping the guard restores the heap order
                drop(weakest);
                Offer::Replaced(evicted.item)
            }
            None => Offer::Rejected(slot.item),
        }
    }

    /// Drain the survivors, best first.
    pub fn into_sorted_vec(self) -> Vec<(f32, T)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|slot| (slot.score, slot.item))
            .collect()
    }
}

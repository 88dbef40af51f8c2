//! Draw-order container.
//!
//! [`BatchedVec`] keeps its elements sorted by [`Batched::batch_key`] so that a
//! plain front-to-back walk visits every distinct key as one contiguous run.
//! Ids handed out by [`BatchedVec::insert`] stay valid while later inserts
//! shift elements around: each id owns an entry in a remap table pointing at
//! the element's current position.
//!
//! Inserting costs a binary search plus a shift of the tail and of the remap
//! table. Iteration is a slice walk. Inserts happen at load time, iteration
//! happens every frame.

use std::ops::{Index, IndexMut};

/// Anything that can be grouped into draw batches.
pub trait Batched {
    type Key: Ord;

    fn batch_key(&self) -> Self::Key;
}

/// Stable handle to an element of a [`BatchedVec`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchId(usize);

impl BatchId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct BatchedVec<T> {
    values: Vec<T>,
    /// `positions[id]` is the index of element `id` inside `values`.
    positions: Vec<usize>,
}

impl<T: Batched> BatchedVec<T> {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            positions: Vec::new(),
        }
    }

    /// Insert `value` behind every element whose key is less or equal, so ties
    /// keep insertion order.
    pub fn insert(&mut self, value: T) -> BatchId {
        let key = value.batch_key();
        let at = self.values.partition_point(|v| v.batch_key() <= key);
        for position in self.positions.iter_mut().filter(|p| **p >= at) {
            *position += 1;
        }
        self.values.insert(at, value);
        self.positions.push(at);
        BatchId(self.positions.len() - 1)
    }

    pub fn get(&self, id: BatchId) -> Option<&T> {
        self.positions.get(id.0).map(|&p| &self.values[p])
    }

    pub fn get_mut(&mut self, id: BatchId) -> Option<&mut T> {
        self.positions.get(id.0).map(|&p| &mut self.values[p])
    }

    /// Current draw position of `id`.
    pub fn position(&self, id: BatchId) -> Option<usize> {
        self.positions.get(id.0).copied()
    }

    /// Elements in draw order.
    pub fn native_sequence(&self) -> &[T] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.values.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.values.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<T: Batched> Default for BatchedVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Batched> Index<BatchId> for BatchedVec<T> {
    type Output = T;

    fn index(&self, id: BatchId) -> &T {
        match self.get(id) {
            Some(value) => value,
            None => panic!("batch id {} was never handed out", id.0),
        }
    }
}

impl<T: Batched> IndexMut<BatchId> for BatchedVec<T> {
    fn index_mut(&mut self, id: BatchId) -> &mut T {
        match self.get_mut(id) {
            Some(value) => value,
            None => panic!("batch id {} was never handed out", id.0),
        }
    }
}

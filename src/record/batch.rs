//! Fixed-capacity tuple batches (pages)

use serde::{Deserialize, Serialize};

use super::errors::{RecordError, RecordResult};
use super::tuple::Tuple;

/// A bounded, insertion-ordered sequence of tuples.
///
/// The capacity is fixed when the batch is created. Passing a batch to
/// another operator moves it; batches are never shared mutably.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    capacity: usize,
    tuples: Vec<Tuple>,
}

impl Batch {
    /// Creates an empty batch holding at most `capacity` tuples
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tuples: Vec::with_capacity(capacity),
        }
    }

    /// Splits `tuples` into consecutive batches of `capacity`, preserving order
    pub fn chunk(tuples: Vec<Tuple>, capacity: usize) -> Vec<Batch> {
        let mut batches = Vec::with_capacity(tuples.len() / capacity.max(1) + 1);
        let mut current = Batch::new(capacity);
        for tuple in tuples {
            if current.is_full() {
                batches.push(std::mem::replace(&mut current, Batch::new(capacity)));
            }
            current.tuples.push(tuple);
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tuples.len() >= self.capacity
    }

    /// Appends a tuple. A full batch rejects the tuple with `BatchFull`.
    pub fn push(&mut self, tuple: Tuple) -> RecordResult<()> {
        if self.is_full() {
            return Err(RecordError::BatchFull(self.capacity));
        }
        self.tuples.push(tuple);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Tuple> {
        self.tuples.get(index)
    }

    pub fn tuples(&self) -> &[Tuple] {
        &self.tuples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tuple> {
        self.tuples.iter()
    }

    pub fn into_tuples(self) -> Vec<Tuple> {
        self.tuples
    }

    /// Returns whether the size/capacity invariant holds.
    ///
    /// Batches read back from a run file are checked with this.
    pub fn is_well_formed(&self) -> bool {
        self.capacity > 0 && self.tuples.len() <= self.capacity
    }
}

impl IntoIterator for Batch {
    type Item = Tuple;
    type IntoIter = std::vec::IntoIter<Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.tuples.into_iter()
    }
}

//! Tuples

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::Value;

/// An ordered sequence of values matching some schema's arity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at position `index`
    pub fn value(&self, index: usize) -> &Value {
        &self.values[index]
    }

    /// Compares two tuples of the same schema on one attribute position
    pub fn compare_at(&self, other: &Tuple, index: usize) -> Ordering {
        self.values[index].compare(&other.values[index])
    }

    /// Compares `self[left_index]` against `other[right_index]`.
    ///
    /// Used for join keys, where the two tuples come from different schemas.
    pub fn compare_across(&self, other: &Tuple, left_index: usize, right_index: usize) -> Ordering {
        self.values[left_index].compare(&other.values[right_index])
    }

    /// Returns whether the join keys of the two tuples are equal
    pub fn joins_with(&self, other: &Tuple, left_index: usize, right_index: usize) -> bool {
        self.compare_across(other, left_index, right_index) == Ordering::Equal
    }

    /// Concatenates `self` and `other`, left values first
    pub fn join(&self, other: &Tuple) -> Tuple {
        let mut values = Vec::with_capacity(self.values.len() + other.values.len());
        values.extend(self.values.iter().cloned());
        values.extend(other.values.iter().cloned());
        Tuple { values }
    }

    /// New tuple holding the values at `positions`, in that order
    pub fn project(&self, positions: &[usize]) -> Tuple {
        Tuple {
            values: positions.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Tuple::new(values)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

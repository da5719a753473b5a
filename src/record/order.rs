//! Sort keys and key-sequence comparison

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::RecordResult;
use super::schema::{Attribute, Schema};
use super::tuple::Tuple;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One ORDER BY key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub attribute: Attribute,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(attribute: Attribute) -> Self {
        Self {
            attribute,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(attribute: Attribute) -> Self {
        Self {
            attribute,
            direction: SortDirection::Desc,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.attribute, self.direction.as_str())
    }
}

/// Lexicographic comparator over a key sequence, resolved to positions.
///
/// The leftmost key takes precedence; ties fall through to the next key and
/// a tie on every key compares equal.
#[derive(Debug, Clone)]
pub struct TupleComparator {
    keys: Vec<(usize, SortDirection)>,
}

impl TupleComparator {
    /// Resolves `keys` against `schema`
    pub fn new(keys: &[SortKey], schema: &Schema) -> RecordResult<Self> {
        let keys = keys
            .iter()
            .map(|k| Ok((schema.position(&k.attribute)?, k.direction)))
            .collect::<RecordResult<Vec<_>>>()?;
        Ok(Self { keys })
    }

    pub fn compare(&self, a: &Tuple, b: &Tuple) -> Ordering {
        for &(index, direction) in &self.keys {
            let ordering = a.compare_at(b, index);
            if ordering != Ordering::Equal {
                return match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
            }
        }
        Ordering::Equal
    }

    /// Returns whether `tuples` is non-decreasing under this comparator
    pub fn is_sorted(&self, tuples: &[Tuple]) -> bool {
        tuples
            .windows(2)
            .all(|w| self.compare(&w[0], &w[1]) != Ordering::Greater)
    }
}

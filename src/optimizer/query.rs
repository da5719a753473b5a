//! Logical query: what to compute, before any ordering decision

use crate::record::{Attribute, Condition, SortKey};

/// From-list, selections, joins, projection and ordering of one query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogicalQuery {
    pub from: Vec<String>,
    /// Single-relation predicates
    pub selections: Vec<Condition>,
    /// Equi-join conditions between two relations
    pub joins: Vec<Condition>,
    /// Empty means keep every attribute
    pub projection: Vec<Attribute>,
    pub order_by: Vec<SortKey>,
}

impl LogicalQuery {
    pub fn new<I, S>(from: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            from: from.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn select(mut self, condition: Condition) -> Self {
        self.selections.push(condition);
        self
    }

    pub fn join(mut self, condition: Condition) -> Self {
        self.joins.push(condition);
        self
    }

    pub fn project(mut self, attributes: Vec<Attribute>) -> Self {
        self.projection = attributes;
        self
    }

    pub fn order_by(mut self, keys: Vec<SortKey>) -> Self {
        self.order_by = keys;
        self
    }

    /// Join conditions the frame budget is divided over
    pub fn num_joins(&self) -> usize {
        self.joins.len()
    }
}

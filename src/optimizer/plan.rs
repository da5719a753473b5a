//! Physical plan tree produced by the optimizer
//!
//! A join is described once ([`JoinNode`]) and tagged with the
//! [`JoinStrategy`] that will execute it; the engine's dispatcher picks the
//! operator from the tag.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::record::{Attribute, Condition, Schema, SortKey};

/// Execution strategy for a join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    #[default]
    BlockNested,
    SortMerge,
}

impl JoinStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinStrategy::BlockNested => "block_nested",
            JoinStrategy::SortMerge => "sort_merge",
        }
    }
}

impl fmt::Display for JoinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JoinStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block_nested" | "bnlj" => Ok(JoinStrategy::BlockNested),
            "sort_merge" | "smj" => Ok(JoinStrategy::SortMerge),
            other => Err(format!("unknown join strategy '{}'", other)),
        }
    }
}

/// A join: inputs, condition, frame budget and strategy
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    /// Left attribute belongs to `left`, right attribute to `right`
    pub condition: Condition,
    pub num_buffers: usize,
    pub strategy: JoinStrategy,
    schema: Schema,
}

impl JoinNode {
    pub fn new(
        left: PlanNode,
        right: PlanNode,
        condition: Condition,
        num_buffers: usize,
        strategy: JoinStrategy,
    ) -> Self {
        let schema = left.schema().join(right.schema());
        Self {
            left: Box::new(left),
            right: Box::new(right),
            condition,
            num_buffers,
            strategy,
            schema,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// Node of a physical plan
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    Scan {
        relation: String,
        schema: Schema,
    },
    Select {
        input: Box<PlanNode>,
        condition: Condition,
    },
    Join(JoinNode),
    Sort {
        input: Box<PlanNode>,
        keys: Vec<SortKey>,
        num_buffers: usize,
    },
    Project {
        input: Box<PlanNode>,
        attributes: Vec<Attribute>,
        schema: Schema,
    },
}

impl PlanNode {
    pub fn scan(relation: impl Into<String>, schema: Schema) -> Self {
        PlanNode::Scan {
            relation: relation.into(),
            schema,
        }
    }

    pub fn select(input: PlanNode, condition: Condition) -> Self {
        PlanNode::Select {
            input: Box::new(input),
            condition,
        }
    }

    /// Output schema of this node
    pub fn schema(&self) -> &Schema {
        match self {
            PlanNode::Scan { schema, .. } => schema,
            PlanNode::Select { input, .. } => input.schema(),
            PlanNode::Join(join) => join.schema(),
            PlanNode::Sort { input, .. } => input.schema(),
            PlanNode::Project { schema, .. } => schema,
        }
    }

    /// Base relations in left-to-right leaf order
    pub fn relations(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_relations(&mut out);
        out
    }

    fn collect_relations<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            PlanNode::Scan { relation, .. } => out.push(relation),
            PlanNode::Select { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::Project { input, .. } => input.collect_relations(out),
            PlanNode::Join(join) => {
                join.left.collect_relations(out);
                join.right.collect_relations(out);
            }
        }
    }

    /// Number of join nodes in the tree
    pub fn join_count(&self) -> usize {
        match self {
            PlanNode::Scan { .. } => 0,
            PlanNode::Select { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::Project { input, .. } => input.join_count(),
            PlanNode::Join(join) => 1 + join.left.join_count() + join.right.join_count(),
        }
    }

    /// Returns whether every join's right input is a single relation
    pub fn is_left_deep(&self) -> bool {
        match self {
            PlanNode::Scan { .. } => true,
            PlanNode::Select { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::Project { input, .. } => input.is_left_deep(),
            PlanNode::Join(join) => join.right.join_count() == 0 && join.left.is_left_deep(),
        }
    }
}

//! Greedy join ordering
//!
//! # Algorithm
//!
//! 1. Wrap each relation's scan in its selections.
//! 2. Order the relations that take part in a join by ascending
//!    cardinality (from-list order breaks ties).
//! 3. For each relation in that order, take every unused join condition
//!    touching it, sort them by the cardinality of their other relation, and
//!    attach the relation not yet in the tree as the right input of a new
//!    join. The built tree is always the left input.
//! 4. Put a sort above the joins for ORDER BY, then the projection.
//!
//! # Invariants
//!
//! - Each join condition is consumed exactly once
//! - The tree is left-deep and connected at every step
//! - Every from-list relation appears exactly once

use std::collections::{HashMap, HashSet};

use super::catalog::Catalog;
use super::errors::{PlannerError, PlannerResult};
use super::plan::{JoinNode, JoinStrategy, PlanNode};
use super::query::LogicalQuery;
use crate::observability::{log_event_with_fields, Event};
use crate::record::{Attribute, Condition};

/// Minimum frames a join operator can run in
pub const MIN_BUFFERS_PER_JOIN: usize = 3;

/// Splits `total` frames evenly across `joins` joins
pub fn buffers_per_join(total: usize, joins: usize) -> PlannerResult<usize> {
    if joins == 0 {
        return Ok(total);
    }
    let per_join = total / joins;
    if per_join < MIN_BUFFERS_PER_JOIN {
        return Err(PlannerError::insufficient_buffers(total, joins));
    }
    Ok(per_join)
}

fn check_output(root: &PlanNode, attribute: &Attribute) -> PlannerResult<()> {
    if root.schema().contains(attribute) {
        Ok(())
    } else {
        Err(PlannerError::unknown_attribute(
            attribute.table.as_str(),
            &attribute.column,
        ))
    }
}

/// Builds left-deep join trees smallest-relation-first
pub struct GreedyOptimizer<'a, C: Catalog + ?Sized> {
    catalog: &'a C,
    strategy: JoinStrategy,
    buffers_per_join: usize,
    sort_buffers: usize,
}

/// Tree under construction
struct Builder {
    root: Option<PlanNode>,
    in_tree: HashSet<String>,
    leaves: HashMap<String, PlanNode>,
    deferred: Vec<Condition>,
}

impl<'a, C: Catalog + ?Sized> GreedyOptimizer<'a, C> {
    pub fn new(catalog: &'a C, strategy: JoinStrategy, buffers_per_join: usize) -> Self {
        Self {
            catalog,
            strategy,
            buffers_per_join,
            sort_buffers: buffers_per_join,
        }
    }

    /// Frames given to an ORDER BY sort
    pub fn with_sort_buffers(mut self, sort_buffers: usize) -> Self {
        self.sort_buffers = sort_buffers;
        self
    }

    pub fn optimize(&self, query: &LogicalQuery) -> PlannerResult<PlanNode> {
        let leaves = self.leaves(query)?;
        for condition in &query.joins {
            self.check_join(query, condition)?;
        }

        let mut builder = Builder {
            root: None,
            in_tree: HashSet::new(),
            leaves,
            deferred: Vec::new(),
        };

        if query.joins.is_empty() {
            if query.from.len() > 1 {
                return Err(PlannerError::disconnected(&query.from));
            }
            builder.root = builder.leaves.remove(&query.from[0]);
        } else {
            self.order_joins(query, &mut builder)?;
        }

        let unreached: Vec<String> = query
            .from
            .iter()
            .filter(|r| !builder.in_tree.contains(*r))
            .cloned()
            .collect();
        if !builder.deferred.is_empty() || (!query.joins.is_empty() && !unreached.is_empty()) {
            return Err(PlannerError::disconnected(&unreached));
        }

        let mut root = builder
            .root
            .ok_or_else(|| PlannerError::plan_invalid("query produced an empty plan"))?;

        if !query.order_by.is_empty() {
            for key in &query.order_by {
                check_output(&root, &key.attribute)?;
            }
            root = PlanNode::Sort {
                input: Box::new(root),
                keys: query.order_by.clone(),
                num_buffers: self.sort_buffers,
            };
        }

        if !query.projection.is_empty() {
            for attribute in &query.projection {
                check_output(&root, attribute)?;
            }
            let schema = root
                .schema()
                .project(&query.projection)
                .map_err(|e| PlannerError::plan_invalid(e.to_string()))?;
            root = PlanNode::Project {
                input: Box::new(root),
                attributes: query.projection.clone(),
                schema,
            };
        }

        log_event_with_fields(
            Event::PlanBuilt,
            &[
                ("relations", &root.relations().join(",")),
                ("joins", &root.join_count().to_string()),
                ("strategy", self.strategy.as_str()),
            ],
        );
        Ok(root)
    }

    /// Scan per from-list relation, wrapped in its selections
    fn leaves(&self, query: &LogicalQuery) -> PlannerResult<HashMap<String, PlanNode>> {
        if query.from.is_empty() {
            return Err(PlannerError::plan_invalid("from-list is empty"));
        }
        let mut leaves = HashMap::new();
        for name in &query.from {
            let schema = self
                .catalog
                .schema(name)
                .ok_or_else(|| PlannerError::unknown_relation(name.as_str()))?;
            if leaves
                .insert(name.clone(), PlanNode::scan(name.as_str(), schema.clone()))
                .is_some()
            {
                return Err(PlannerError::plan_invalid(format!(
                    "relation '{}' listed twice",
                    name
                )));
            }
        }

        for condition in &query.selections {
            let table = &condition.left.table;
            self.check_in_from(query, table)?;
            self.check_attribute(&condition.left)?;
            if let Some(right) = condition.right_attribute() {
                if right.table != *table {
                    return Err(PlannerError::plan_invalid(format!(
                        "selection {} spans two relations",
                        condition
                    )));
                }
                self.check_attribute(right)?;
            }
            let scan = leaves
                .remove(table)
                .ok_or_else(|| PlannerError::unknown_relation(table.as_str()))?;
            leaves.insert(table.clone(), PlanNode::select(scan, condition.clone()));
        }
        Ok(leaves)
    }

    fn order_joins(&self, query: &LogicalQuery, builder: &mut Builder) -> PlannerResult<()> {
        let mut participants: Vec<&String> = query
            .from
            .iter()
            .filter(|r| query.joins.iter().any(|c| c.touches(r)))
            .collect();
        participants.sort_by_key(|r| self.cardinality(r));

        let mut unused: Vec<Option<&Condition>> = query.joins.iter().map(Some).collect();

        for relation in participants {
            let mut touching: Vec<&Condition> = unused
                .iter_mut()
                .filter(|slot| slot.map_or(false, |c| c.touches(relation)))
                .filter_map(Option::take)
                .collect();
            touching.sort_by_key(|c| {
                c.other_table(relation)
                    .map_or(usize::MAX, |other| self.cardinality(other))
            });

            for condition in touching {
                if builder.root.is_none() {
                    let leaf = builder
                        .leaves
                        .remove(relation.as_str())
                        .ok_or_else(|| PlannerError::unknown_relation(relation.as_str()))?;
                    builder.root = Some(leaf);
                    builder.in_tree.insert(relation.clone());
                }
                if self.attach(builder, condition.clone())? {
                    self.retry_deferred(builder)?;
                }
            }
        }
        Ok(())
    }

    /// Adds `condition` to the tree. Returns `false` if it had to be deferred
    /// because neither of its relations is in the tree yet.
    fn attach(&self, builder: &mut Builder, condition: Condition) -> PlannerResult<bool> {
        let left_table = condition.left.table.clone();
        let right_table = match condition.right_attribute() {
            Some(right) => right.table.clone(),
            None => return Err(PlannerError::plan_invalid("join condition has no right side")),
        };
        let left_in = builder.in_tree.contains(&left_table);
        let right_in = builder.in_tree.contains(&right_table);

        let (new_relation, oriented) = match (left_in, right_in) {
            (true, true) => {
                // Both sides already joined: filter instead of joining again
                let root = self.take_root(builder)?;
                builder.root = Some(PlanNode::select(root, condition));
                return Ok(true);
            }
            (true, false) => (right_table, condition),
            (false, true) => (left_table, condition.flipped()),
            (false, false) => {
                builder.deferred.push(condition);
                return Ok(false);
            }
        };

        let right = builder
            .leaves
            .remove(&new_relation)
            .ok_or_else(|| PlannerError::unknown_relation(new_relation.as_str()))?;
        let left = self.take_root(builder)?;
        builder.root = Some(PlanNode::Join(JoinNode::new(
            left,
            right,
            oriented,
            self.buffers_per_join,
            self.strategy,
        )));
        builder.in_tree.insert(new_relation);
        Ok(true)
    }

    fn retry_deferred(&self, builder: &mut Builder) -> PlannerResult<()> {
        loop {
            let before = builder.deferred.len();
            for condition in std::mem::take(&mut builder.deferred) {
                self.attach(builder, condition)?;
            }
            if builder.deferred.len() == before {
                return Ok(());
            }
        }
    }

    fn take_root(&self, builder: &mut Builder) -> PlannerResult<PlanNode> {
        builder
            .root
            .take()
            .ok_or_else(|| PlannerError::plan_invalid("join attached to an empty tree"))
    }

    fn check_join(&self, query: &LogicalQuery, condition: &Condition) -> PlannerResult<()> {
        if !condition.is_equi_join() {
            return Err(PlannerError::plan_invalid(format!(
                "join condition {} is not an equality between two relations",
                condition
            )));
        }
        self.check_in_from(query, &condition.left.table)?;
        self.check_attribute(&condition.left)?;
        if let Some(right) = condition.right_attribute() {
            self.check_in_from(query, &right.table)?;
            self.check_attribute(right)?;
            if !condition.left.data_type.comparable_with(&right.data_type) {
                return Err(PlannerError::plan_invalid(format!(
                    "join condition {} compares {} with {}",
                    condition, condition.left.data_type, right.data_type
                )));
            }
        }
        Ok(())
    }

    fn check_in_from(&self, query: &LogicalQuery, table: &str) -> PlannerResult<()> {
        if query.from.iter().any(|r| r == table) {
            Ok(())
        } else {
            Err(PlannerError::unknown_relation(table))
        }
    }

    fn check_attribute(&self, attribute: &Attribute) -> PlannerResult<()> {
        let schema = self
            .catalog
            .schema(&attribute.table)
            .ok_or_else(|| PlannerError::unknown_relation(attribute.table.as_str()))?;
        if schema.contains(attribute) {
            Ok(())
        } else {
            Err(PlannerError::unknown_attribute(
                attribute.table.as_str(),
                &attribute.column,
            ))
        }
    }

    fn cardinality(&self, relation: &str) -> usize {
        self.catalog.cardinality(relation).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::catalog::{MemoryCatalog, Relation};
    use crate::optimizer::PlannerErrorCode;
    use crate::record::{CompareOp, DataType, Schema, Tuple, Value};

    fn attr(table: &str, column: &str) -> Attribute {
        Attribute::new(table, column, DataType::Int)
    }

    fn relation(name: &str, columns: &[&str], n: i32) -> Relation {
        let schema = Schema::new(columns.iter().map(|c| attr(name, c)).collect());
        let rows = (0..n)
            .map(|i| Tuple::new(columns.iter().map(|_| Value::Int(i)).collect()))
            .collect();
        Relation::new(name, schema, rows).unwrap()
    }

    fn catalog(sizes: &[(&str, i32)]) -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
        for (name, n) in sizes {
            catalog.insert(relation(name, &["id", "fk"], *n));
        }
        catalog
    }

    fn join_conditions(plan: &PlanNode) -> Vec<String> {
        fn walk(node: &PlanNode, out: &mut Vec<String>) {
            match node {
                PlanNode::Join(join) => {
                    walk(&join.left, out);
                    out.push(join.condition.to_string());
                }
                PlanNode::Select { input, .. }
                | PlanNode::Sort { input, .. }
                | PlanNode::Project { input, .. } => walk(input, out),
                PlanNode::Scan { .. } => {}
            }
        }
        let mut out = Vec::new();
        walk(plan, &mut out);
        out
    }

    #[test]
    fn test_smallest_relation_first() {
        let catalog = catalog(&[("R", 100), ("S", 5), ("T", 30)]);
        let query = LogicalQuery::new(["R", "S", "T"])
            .join(Condition::join(attr("R", "id"), attr("S", "fk")))
            .join(Condition::join(attr("S", "id"), attr("T", "fk")));
        let plan = GreedyOptimizer::new(&catalog, JoinStrategy::BlockNested, 5)
            .optimize(&query)
            .unwrap();

        assert_eq!(plan.relations(), vec!["S", "T", "R"]);
        assert!(plan.is_left_deep());
        // Conditions are flipped so the built tree is on the left
        assert_eq!(
            join_conditions(&plan),
            vec!["S.id = T.fk".to_string(), "S.fk = R.id".to_string()]
        );
    }

    #[test]
    fn test_selections_sit_on_scans() {
        let catalog = catalog(&[("R", 10), ("S", 20)]);
        let query = LogicalQuery::new(["R", "S"])
            .select(Condition::select(attr("S", "id"), CompareOp::Gt, Value::Int(3)))
            .join(Condition::join(attr("R", "id"), attr("S", "id")));
        let plan = GreedyOptimizer::new(&catalog, JoinStrategy::SortMerge, 4)
            .optimize(&query)
            .unwrap();

        let PlanNode::Join(join) = &plan else {
            panic!("expected a join at the root");
        };
        assert_eq!(join.strategy, JoinStrategy::SortMerge);
        assert_eq!(join.num_buffers, 4);
        assert!(matches!(join.right.as_ref(), PlanNode::Select { .. }));
    }

    #[test]
    fn test_cycle_becomes_select() {
        let catalog = catalog(&[("A", 1), ("B", 2), ("C", 3)]);
        let query = LogicalQuery::new(["A", "B", "C"])
            .join(Condition::join(attr("A", "id"), attr("B", "id")))
            .join(Condition::join(attr("B", "id"), attr("C", "id")))
            .join(Condition::join(attr("C", "fk"), attr("A", "fk")));
        let plan = GreedyOptimizer::new(&catalog, JoinStrategy::BlockNested, 3)
            .optimize(&query)
            .unwrap();
        assert_eq!(plan.join_count(), 2);
        assert_eq!(plan.relations(), vec!["A", "B", "C"]);
        assert!(matches!(plan, PlanNode::Select { .. }));
    }

    #[test]
    fn test_deferred_condition_attaches_later() {
        // D comes second by size, but C-D has no relation in the tree yet
        // and waits until B-C brings C in
        let catalog = catalog(&[("A", 1), ("B", 50), ("C", 60), ("D", 2)]);
        let query = LogicalQuery::new(["A", "B", "C", "D"])
            .join(Condition::join(attr("A", "id"), attr("B", "id")))
            .join(Condition::join(attr("C", "id"), attr("D", "id")))
            .join(Condition::join(attr("B", "fk"), attr("C", "fk")));
        let plan = GreedyOptimizer::new(&catalog, JoinStrategy::BlockNested, 3)
            .optimize(&query)
            .unwrap();
        assert_eq!(plan.relations(), vec!["A", "B", "C", "D"]);
        assert_eq!(plan.join_count(), 3);
    }

    #[test]
    fn test_disconnected_rejected() {
        let catalog = catalog(&[("A", 1), ("B", 2), ("C", 3)]);
        let query = LogicalQuery::new(["A", "B", "C"])
            .join(Condition::join(attr("A", "id"), attr("B", "id")));
        let err = GreedyOptimizer::new(&catalog, JoinStrategy::BlockNested, 3)
            .optimize(&query)
            .unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::QpPlanDisconnected);
    }

    #[test]
    fn test_single_relation_with_order_and_projection() {
        let catalog = catalog(&[("R", 10)]);
        let query = LogicalQuery::new(["R"])
            .order_by(vec![crate::record::SortKey::desc(attr("R", "fk"))])
            .project(vec![attr("R", "id")]);
        let plan = GreedyOptimizer::new(&catalog, JoinStrategy::BlockNested, 8)
            .optimize(&query)
            .unwrap();
        let PlanNode::Project { input, schema, .. } = &plan else {
            panic!("expected a projection at the root");
        };
        assert_eq!(schema.len(), 1);
        assert!(matches!(input.as_ref(), PlanNode::Sort { num_buffers: 8, .. }));
    }

    #[test]
    fn test_unknown_names_rejected() {
        let catalog = catalog(&[("R", 10)]);
        let optimizer = GreedyOptimizer::new(&catalog, JoinStrategy::BlockNested, 3);
        assert!(optimizer.optimize(&LogicalQuery::new(["X"])).is_err());
        let query = LogicalQuery::new(["R"]).project(vec![attr("R", "nope")]);
        assert!(optimizer.optimize(&query).is_err());
    }

    #[test]
    fn test_non_equi_join_rejected() {
        let catalog = catalog(&[("R", 10), ("S", 10)]);
        let mut cond = Condition::join(attr("R", "id"), attr("S", "id"));
        cond.op = CompareOp::Lt;
        let query = LogicalQuery::new(["R", "S"]).join(cond);
        assert!(GreedyOptimizer::new(&catalog, JoinStrategy::BlockNested, 3)
            .optimize(&query)
            .is_err());
    }

    #[test]
    fn test_join_key_types_must_match() {
        let mut catalog = catalog(&[("R", 10)]);
        let price = Attribute::new("P", "price", DataType::Real);
        let rows = (0..4).map(|i| Tuple::new(vec![Value::Real(i as f64)])).collect();
        catalog.insert(Relation::new("P", Schema::new(vec![price.clone()]), rows).unwrap());

        let query = LogicalQuery::new(["R", "P"]).join(Condition::join(attr("R", "id"), price));
        let err = GreedyOptimizer::new(&catalog, JoinStrategy::SortMerge, 3)
            .optimize(&query)
            .unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::QpPlanInvalid);
    }

    #[test]
    fn test_buffers_per_join() {
        assert_eq!(buffers_per_join(10, 2).unwrap(), 5);
        assert_eq!(buffers_per_join(10, 0).unwrap(), 10);
        assert!(buffers_per_join(5, 2).is_err());
    }
}

//! Plan to operator-tree dispatch

use std::sync::Arc;

use super::context::ExecutionContext;
use crate::operator::{
    BlockNestedJoin, BoxedOperator, ExecutorResult, ExternalSort, Project, Select,
    SortMergeJoin,
};
use crate::optimizer::{JoinStrategy, PlanNode};

/// Source of base-relation scans
pub trait TableProvider {
    fn scan(&self, relation: &str, ctx: &Arc<ExecutionContext>) -> ExecutorResult<BoxedOperator>;
}

/// Builds the executable operator tree for `plan`.
///
/// Joins are bound to the operator named by their strategy tag.
pub fn build_operator(
    plan: &PlanNode,
    provider: &dyn TableProvider,
    ctx: &Arc<ExecutionContext>,
) -> ExecutorResult<BoxedOperator> {
    let operator: BoxedOperator = match plan {
        PlanNode::Scan { relation, .. } => provider.scan(relation, ctx)?,
        PlanNode::Select { input, condition } => {
            let input = build_operator(input, provider, ctx)?;
            Box::new(Select::new(input, condition.clone(), Arc::clone(ctx))?)
        }
        PlanNode::Join(join) => {
            let left = build_operator(&join.left, provider, ctx)?;
            let right = build_operator(&join.right, provider, ctx)?;
            let condition = join.condition.clone();
            match join.strategy {
                JoinStrategy::BlockNested => Box::new(BlockNestedJoin::new(
                    left,
                    right,
                    condition,
                    join.num_buffers,
                    Arc::clone(ctx),
                )?),
                JoinStrategy::SortMerge => Box::new(SortMergeJoin::new(
                    left,
                    right,
                    condition,
                    join.num_buffers,
                    Arc::clone(ctx),
                )?),
            }
        }
        PlanNode::Sort {
            input,
            keys,
            num_buffers,
        } => {
            let input = build_operator(input, provider, ctx)?;
            Box::new(ExternalSort::new(
                input,
                keys.clone(),
                *num_buffers,
                Arc::clone(ctx),
            )?)
        }
        PlanNode::Project {
            input, attributes, ..
        } => {
            let input = build_operator(input, provider, ctx)?;
            Box::new(Project::new(input, attributes, Arc::clone(ctx))?)
        }
    };
    Ok(operator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::{GreedyOptimizer, LogicalQuery, MemoryCatalog, Relation};
    use crate::record::{Attribute, Condition, DataType, Schema, Tuple, Value};
    use tempfile::TempDir;

    fn catalog() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
        for (name, n) in [("R", 4), ("S", 3)] {
            let schema = Schema::new(vec![Attribute::new(name, "id", DataType::Int)]);
            let rows = (0..n).map(|i| Tuple::new(vec![Value::Int(i)])).collect();
            catalog.insert(Relation::new(name, schema, rows).unwrap());
        }
        catalog
    }

    #[test]
    fn test_dispatch_by_strategy() {
        let dir = TempDir::new().unwrap();
        let ctx = Arc::new(ExecutionContext::new(64, dir.path()).unwrap());
        let catalog = catalog();
        let query = LogicalQuery::new(["R", "S"]).join(Condition::join(
            Attribute::new("R", "id", DataType::Int),
            Attribute::new("S", "id", DataType::Int),
        ));

        for (strategy, name) in [
            (JoinStrategy::BlockNested, "BlockNestedJoin"),
            (JoinStrategy::SortMerge, "SortMergeJoin"),
        ] {
            let plan = GreedyOptimizer::new(&catalog, strategy, 3)
                .optimize(&query)
                .unwrap();
            let op = build_operator(&plan, &catalog, &ctx).unwrap();
            assert_eq!(op.name(), name);
            assert_eq!(op.schema().len(), 2);
        }
    }

    #[test]
    fn test_missing_relation_fails_before_execution() {
        let dir = TempDir::new().unwrap();
        let ctx = Arc::new(ExecutionContext::new(64, dir.path()).unwrap());
        let plan = PlanNode::scan(
            "Nowhere",
            Schema::new(vec![Attribute::new("Nowhere", "id", DataType::Int)]),
        );
        assert!(build_operator(&plan, &catalog(), &ctx).is_err());
    }
}

//! Relation metadata and in-memory storage

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine::{ExecutionContext, TableProvider};
use crate::operator::{BoxedOperator, ExecutorError, ExecutorResult, TableScan};
use crate::record::{RecordResult, Schema, Tuple};

/// Schema and cardinality lookups keyed by relation name
pub trait Catalog {
    fn schema(&self, relation: &str) -> Option<&Schema>;

    /// Estimated tuple count
    fn cardinality(&self, relation: &str) -> Option<usize>;
}

/// A named base relation held in memory
#[derive(Debug, Clone)]
pub struct Relation {
    name: String,
    schema: Schema,
    rows: Arc<Vec<Tuple>>,
}

impl Relation {
    /// Builds a relation, checking every row against `schema`
    pub fn new(name: impl Into<String>, schema: Schema, rows: Vec<Tuple>) -> RecordResult<Self> {
        for row in &rows {
            schema.check(row)?;
        }
        Ok(Self {
            name: name.into(),
            schema,
            rows: Arc::new(rows),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &Arc<Vec<Tuple>> {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Catalog and table source backed by in-memory relations
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    relations: BTreeMap<String, Relation>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a relation
    pub fn insert(&mut self, relation: Relation) {
        self.relations.insert(relation.name.clone(), relation);
    }

    pub fn get(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }
}

impl Catalog for MemoryCatalog {
    fn schema(&self, relation: &str) -> Option<&Schema> {
        self.relations.get(relation).map(Relation::schema)
    }

    fn cardinality(&self, relation: &str) -> Option<usize> {
        self.relations.get(relation).map(Relation::len)
    }
}

impl TableProvider for MemoryCatalog {
    fn scan(&self, relation: &str, ctx: &Arc<ExecutionContext>) -> ExecutorResult<BoxedOperator> {
        let stored = self.relations.get(relation).ok_or_else(|| {
            ExecutorError::setup_failed(format!("relation '{}' not found", relation))
                .in_operator("TableScan")
        })?;
        Ok(Box::new(TableScan::new(
            stored.name.clone(),
            stored.schema.clone(),
            Arc::clone(&stored.rows),
            Arc::clone(ctx),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Attribute, DataType, Value};
    use tempfile::TempDir;

    fn relation(name: &str, n: i32) -> Relation {
        let schema = Schema::new(vec![Attribute::new(name, "id", DataType::Int)]);
        let rows = (0..n).map(|i| Tuple::new(vec![Value::Int(i)])).collect();
        Relation::new(name, schema, rows).unwrap()
    }

    #[test]
    fn test_lookups() {
        let mut catalog = MemoryCatalog::new();
        catalog.insert(relation("R", 12));
        assert_eq!(catalog.cardinality("R"), Some(12));
        assert_eq!(catalog.schema("R").unwrap().len(), 1);
        assert!(catalog.schema("S").is_none());
    }

    #[test]
    fn test_rows_checked_against_schema() {
        let schema = Schema::new(vec![Attribute::new("R", "id", DataType::Int)]);
        let bad = vec![Tuple::new(vec![Value::Text("x".into())])];
        assert!(Relation::new("R", schema, bad).is_err());
    }

    #[test]
    fn test_scan_unknown_relation_is_setup_failure() {
        let dir = TempDir::new().unwrap();
        let ctx = Arc::new(ExecutionContext::new(64, dir.path()).unwrap());
        let catalog = MemoryCatalog::new();
        let err = catalog.scan("missing", &ctx).err().unwrap();
        assert!(!err.is_fatal());
    }
}

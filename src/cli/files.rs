//! Catalog and query file formats
//!
//! Catalog:
//!
//! ```json
//! {"relations": [{"name": "R", "columns": [{"name": "a", "type": "int"}], "rows": [[1]]}]}
//! ```
//!
//! Query (attributes are written `relation.column`):
//!
//! ```json
//! {
//!   "from": ["R", "S"],
//!   "select": [{"left": "R.a", "op": ">", "value": 5}],
//!   "join": [{"left": "R.a", "right": "S.b"}],
//!   "project": ["R.a"],
//!   "order_by": [{"attr": "R.a", "desc": false}]
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::errors::{CliError, CliResult};
use crate::optimizer::{Catalog, LogicalQuery, MemoryCatalog, PlannerError, Relation};
use crate::record::{
    Attribute, CompareOp, Condition, DataType, Operand, Schema, SortKey, Tuple, Value,
};

#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub relations: Vec<RelationFile>,
}

#[derive(Debug, Deserialize)]
pub struct RelationFile {
    pub name: String,
    pub columns: Vec<ColumnFile>,
    #[serde(default)]
    pub rows: Vec<Vec<JsonValue>>,
}

#[derive(Debug, Deserialize)]
pub struct ColumnFile {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl CatalogFile {
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::io_error(format!("Failed to read catalog {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Type-checks every row and builds the in-memory catalog
    pub fn into_catalog(self) -> CliResult<MemoryCatalog> {
        let mut catalog = MemoryCatalog::new();
        for relation in self.relations {
            if catalog.get(&relation.name).is_some() {
                return Err(CliError::invalid_input(format!(
                    "relation '{}' defined twice",
                    relation.name
                )));
            }
            let attributes = relation
                .columns
                .iter()
                .map(|c| {
                    let data_type: DataType = c.data_type.parse()?;
                    Ok(Attribute::new(relation.name.as_str(), c.name.as_str(), data_type))
                })
                .collect::<CliResult<Vec<_>>>()?;

            let mut rows = Vec::with_capacity(relation.rows.len());
            for (i, row) in relation.rows.iter().enumerate() {
                if row.len() != attributes.len() {
                    return Err(CliError::invalid_input(format!(
                        "{} row {} has {} values, expected {}",
                        relation.name,
                        i,
                        row.len(),
                        attributes.len()
                    )));
                }
                let values = row
                    .iter()
                    .zip(&attributes)
                    .map(|(json, a)| Value::from_json(json, a.data_type))
                    .collect::<Result<Vec<_>, _>>()?;
                rows.push(Tuple::new(values));
            }

            catalog.insert(Relation::new(
                relation.name.as_str(),
                Schema::new(attributes),
                rows,
            )?);
        }
        Ok(catalog)
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryFile {
    pub from: Vec<String>,
    #[serde(default, rename = "select")]
    pub selections: Vec<SelectionFile>,
    #[serde(default, rename = "join")]
    pub joins: Vec<JoinFile>,
    #[serde(default)]
    pub project: Vec<String>,
    #[serde(default)]
    pub order_by: Vec<OrderFile>,
}

/// `left op value`, or `left op right` for two attributes of one relation
#[derive(Debug, Deserialize)]
pub struct SelectionFile {
    pub left: String,
    #[serde(default = "default_op")]
    pub op: String,
    #[serde(default)]
    pub value: Option<JsonValue>,
    #[serde(default)]
    pub right: Option<String>,
}

fn default_op() -> String {
    "=".to_string()
}

#[derive(Debug, Deserialize)]
pub struct JoinFile {
    pub left: String,
    pub right: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderFile {
    pub attr: String,
    #[serde(default)]
    pub desc: bool,
}

impl QueryFile {
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::io_error(format!("Failed to read query {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Resolves attribute names and literals against `catalog`
    pub fn resolve(&self, catalog: &dyn Catalog) -> CliResult<LogicalQuery> {
        let mut query = LogicalQuery::new(self.from.iter().cloned());

        for selection in &self.selections {
            let left = resolve_attribute(catalog, &selection.left)?;
            let op = CompareOp::from_symbol(&selection.op).ok_or_else(|| {
                CliError::invalid_input(format!("unknown operator '{}'", selection.op))
            })?;
            let right = match (&selection.value, &selection.right) {
                (Some(json), None) => Operand::Literal(Value::from_json(json, left.data_type)?),
                (None, Some(name)) => Operand::Attribute(resolve_attribute(catalog, name)?),
                _ => {
                    return Err(CliError::invalid_input(format!(
                        "selection on {} needs exactly one of 'value' or 'right'",
                        selection.left
                    )))
                }
            };
            query = query.select(Condition { left, op, right });
        }

        for join in &self.joins {
            query = query.join(Condition::join(
                resolve_attribute(catalog, &join.left)?,
                resolve_attribute(catalog, &join.right)?,
            ));
        }

        let projection = self
            .project
            .iter()
            .map(|name| resolve_attribute(catalog, name))
            .collect::<CliResult<Vec<_>>>()?;

        let order_by = self
            .order_by
            .iter()
            .map(|o| {
                let attribute = resolve_attribute(catalog, &o.attr)?;
                Ok(if o.desc {
                    SortKey::desc(attribute)
                } else {
                    SortKey::asc(attribute)
                })
            })
            .collect::<CliResult<Vec<_>>>()?;

        Ok(query.project(projection).order_by(order_by))
    }
}

/// Looks up `relation.column` in the catalog
fn resolve_attribute(catalog: &dyn Catalog, name: &str) -> CliResult<Attribute> {
    let (table, column) = name.split_once('.').ok_or_else(|| {
        CliError::invalid_input(format!("attribute '{}' must be written relation.column", name))
    })?;
    let schema = catalog
        .schema(table)
        .ok_or_else(|| PlannerError::unknown_relation(table))?;
    schema
        .resolve(table, column)
        .cloned()
        .ok_or_else(|| PlannerError::unknown_attribute(table, column).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::errors::CliErrorCode;

    fn catalog() -> MemoryCatalog {
        let file: CatalogFile = serde_json::from_str(
            r#"{"relations": [
                {"name": "R", "columns": [{"name": "a", "type": "int"}, {"name": "n", "type": "text(8)"}],
                 "rows": [[1, "one"], [2, "two"]]},
                {"name": "S", "columns": [{"name": "b", "type": "int"}], "rows": [[2]]}
            ]}"#,
        )
        .unwrap();
        file.into_catalog().unwrap()
    }

    #[test]
    fn test_catalog_rows_typed() {
        let catalog = catalog();
        assert_eq!(catalog.cardinality("R"), Some(2));
        assert_eq!(catalog.schema("R").unwrap().tuple_size(), 12);
    }

    #[test]
    fn test_bad_row_rejected() {
        let file: CatalogFile = serde_json::from_str(
            r#"{"relations": [{"name": "R", "columns": [{"name": "a", "type": "int"}], "rows": [["x"]]}]}"#,
        )
        .unwrap();
        assert!(file.into_catalog().is_err());
    }

    #[test]
    fn test_query_resolution() {
        let file: QueryFile = serde_json::from_str(
            r#"{"from": ["R", "S"],
                "select": [{"left": "R.a", "op": ">=", "value": 2}],
                "join": [{"left": "R.a", "right": "S.b"}],
                "project": ["R.n"],
                "order_by": [{"attr": "R.a", "desc": true}]}"#,
        )
        .unwrap();
        let query = file.resolve(&catalog()).unwrap();
        assert_eq!(query.from, vec!["R".to_string(), "S".to_string()]);
        assert_eq!(query.selections[0].op, CompareOp::Ge);
        assert_eq!(query.joins[0].to_string(), "R.a = S.b");
        assert_eq!(query.projection[0].data_type, DataType::Text(8));
        assert_eq!(query.order_by[0], SortKey::desc(Attribute::new("R", "a", DataType::Int)));
    }

    #[test]
    fn test_unknown_names() {
        let file: QueryFile =
            serde_json::from_str(r#"{"from": ["R"], "project": ["R.zzz"]}"#).unwrap();
        let err = file.resolve(&catalog()).unwrap_err();
        assert_eq!(err.code(), CliErrorCode::PlanRejected);

        let file: QueryFile = serde_json::from_str(r#"{"from": ["R"], "project": ["a"]}"#).unwrap();
        assert_eq!(
            file.resolve(&catalog()).unwrap_err().code(),
            CliErrorCode::InvalidInput
        );
    }
}

//! Attributes and schemas

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::{RecordError, RecordResult};
use super::tuple::Tuple;
use super::types::DataType;

/// A column of a relation, identified by value.
///
/// Two attributes with the same relation, column and type are interchangeable,
/// so attributes are used directly as map and set keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    /// Owning relation name
    pub table: String,
    /// Column name
    pub column: String,
    /// Column type
    pub data_type: DataType,
}

impl Attribute {
    pub fn new(table: impl Into<String>, column: impl Into<String>, data_type: DataType) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            data_type,
        }
    }

    /// Returns the byte width of this attribute
    pub fn width(&self) -> usize {
        self.data_type.width()
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Ordered attribute list with a derived fixed tuple size.
///
/// Immutable once built; joins and projections derive new schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    attributes: Vec<Attribute>,
    tuple_size: usize,
}

impl Schema {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        let tuple_size = attributes.iter().map(Attribute::width).sum();
        Self {
            attributes,
            tuple_size,
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Fixed byte size of one tuple of this schema
    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    /// Position of `attribute`, if present
    pub fn index_of(&self, attribute: &Attribute) -> Option<usize> {
        self.attributes.iter().position(|a| a == attribute)
    }

    /// Position of `attribute`, or `AttributeNotFound`
    pub fn position(&self, attribute: &Attribute) -> RecordResult<usize> {
        self.index_of(attribute)
            .ok_or_else(|| RecordError::AttributeNotFound(attribute.to_string()))
    }

    pub fn contains(&self, attribute: &Attribute) -> bool {
        self.index_of(attribute).is_some()
    }

    /// Looks up an attribute by relation and column name
    pub fn resolve(&self, table: &str, column: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.table == table && a.column == column)
    }

    /// Schema of `self` concatenated with `other`, left attributes first
    pub fn join(&self, other: &Schema) -> Schema {
        let mut attributes = self.attributes.clone();
        attributes.extend(other.attributes.iter().cloned());
        Schema::new(attributes)
    }

    /// Positional subset of this schema in the order given
    pub fn project(&self, attributes: &[Attribute]) -> RecordResult<Schema> {
        for attribute in attributes {
            self.position(attribute)?;
        }
        Ok(Schema::new(attributes.to_vec()))
    }

    /// Number of tuples of this schema that fit in a page of `page_size` bytes
    pub fn batch_capacity(&self, page_size: usize) -> RecordResult<usize> {
        let capacity = page_size / self.tuple_size.max(1);
        if capacity == 0 {
            return Err(RecordError::PageTooSmall {
                page_size,
                tuple_size: self.tuple_size,
            });
        }
        Ok(capacity)
    }

    /// Checks that `tuple` has this schema's arity and column types
    pub fn check(&self, tuple: &Tuple) -> RecordResult<()> {
        if tuple.len() != self.len() {
            return Err(RecordError::ArityMismatch {
                expected: self.len(),
                actual: tuple.len(),
            });
        }
        for (attribute, value) in self.attributes.iter().zip(tuple.values()) {
            if !attribute.data_type.accepts(value) {
                return Err(RecordError::TypeMismatch {
                    expected: attribute.data_type.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.attributes.iter().map(|a| a.to_string()).collect();
        write!(f, "({})", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;

    fn schema_rs() -> (Schema, Schema) {
        let r = Schema::new(vec![
            Attribute::new("R", "a", DataType::Int),
            Attribute::new("R", "name", DataType::Text(12)),
        ]);
        let s = Schema::new(vec![Attribute::new("S", "b", DataType::Real)]);
        (r, s)
    }

    #[test]
    fn test_tuple_size_is_sum_of_widths() {
        let (r, s) = schema_rs();
        assert_eq!(r.tuple_size(), 16);
        assert_eq!(s.tuple_size(), 8);
        assert_eq!(r.join(&s).tuple_size(), 24);
    }

    #[test]
    fn test_join_preserves_left_then_right() {
        let (r, s) = schema_rs();
        let joined = r.join(&s);
        assert_eq!(joined.attributes()[0].to_string(), "R.a");
        assert_eq!(joined.attributes()[2].to_string(), "S.b");
        assert_eq!(joined.index_of(&s.attributes()[0]), Some(2));
    }

    #[test]
    fn test_batch_capacity() {
        let (r, _) = schema_rs();
        assert_eq!(r.batch_capacity(64).unwrap(), 4);
        assert_eq!(r.batch_capacity(31).unwrap(), 1);
        assert!(matches!(
            r.batch_capacity(15),
            Err(RecordError::PageTooSmall { .. })
        ));
    }

    #[test]
    fn test_project_rejects_unknown_attribute() {
        let (r, s) = schema_rs();
        let projected = r.project(&[r.attributes()[1].clone()]).unwrap();
        assert_eq!(projected.len(), 1);
        assert!(r.project(&[s.attributes()[0].clone()]).is_err());
    }

    #[test]
    fn test_check_tuple() {
        let (r, _) = schema_rs();
        assert!(r.check(&Tuple::new(vec![Value::Int(1), "x".into()])).is_ok());
        assert!(r.check(&Tuple::new(vec![Value::Int(1)])).is_err());
        assert!(r.check(&Tuple::new(vec!["x".into(), Value::Int(1)])).is_err());
    }
}

//! Selection and join conditions

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::schema::Attribute;
use super::types::Value;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Returns whether `ordering` (left compared to right) satisfies the operator
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }

    /// Operator to use when the two operands swap sides
    pub fn mirrored(&self) -> CompareOp {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => *other,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Parses an operator symbol
    pub fn from_symbol(symbol: &str) -> Option<CompareOp> {
        match symbol.trim() {
            "=" | "==" => Some(CompareOp::Eq),
            "!=" | "<>" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }
}

/// Right-hand side of a condition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    /// Another attribute (join, or intra-tuple comparison)
    Attribute(Attribute),
    /// A constant (selection)
    Literal(Value),
}

/// A predicate `left op right`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub left: Attribute,
    pub op: CompareOp,
    pub right: Operand,
}

impl Condition {
    /// Equi-join condition `left = right`
    pub fn join(left: Attribute, right: Attribute) -> Self {
        Self {
            left,
            op: CompareOp::Eq,
            right: Operand::Attribute(right),
        }
    }

    /// Selection condition `attribute op literal`
    pub fn select(attribute: Attribute, op: CompareOp, value: Value) -> Self {
        Self {
            left: attribute,
            op,
            right: Operand::Literal(value),
        }
    }

    /// Right attribute, when the right side is not a literal
    pub fn right_attribute(&self) -> Option<&Attribute> {
        match &self.right {
            Operand::Attribute(attribute) => Some(attribute),
            Operand::Literal(_) => None,
        }
    }

    /// Returns whether this is an equality between attributes of two relations
    pub fn is_equi_join(&self) -> bool {
        self.op == CompareOp::Eq
            && self
                .right_attribute()
                .map_or(false, |r| r.table != self.left.table)
    }

    /// Returns whether either side refers to `table`
    pub fn touches(&self, table: &str) -> bool {
        self.left.table == table || self.right_attribute().map_or(false, |r| r.table == table)
    }

    /// Relation on the other side of `table`, for attribute-attribute conditions
    pub fn other_table(&self, table: &str) -> Option<&str> {
        let right = self.right_attribute()?;
        if self.left.table == table {
            Some(&right.table)
        } else if right.table == table {
            Some(&self.left.table)
        } else {
            None
        }
    }

    /// The same condition with its sides swapped.
    ///
    /// Literal conditions are returned unchanged.
    pub fn flipped(&self) -> Condition {
        match &self.right {
            Operand::Attribute(right) => Condition {
                left: right.clone(),
                op: self.op.mirrored(),
                right: Operand::Attribute(self.left.clone()),
            },
            Operand::Literal(_) => self.clone(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.right {
            Operand::Attribute(right) => write!(f, "{} {} {}", self.left, self.op.symbol(), right),
            Operand::Literal(value) => write!(f, "{} {} {}", self.left, self.op.symbol(), value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DataType;

    fn attr(table: &str, column: &str) -> Attribute {
        Attribute::new(table, column, DataType::Int)
    }

    #[test]
    fn test_flip_swaps_sides_and_mirrors_op() {
        let cond = Condition {
            left: attr("R", "a"),
            op: CompareOp::Lt,
            right: Operand::Attribute(attr("S", "b")),
        };
        let flipped = cond.flipped();
        assert_eq!(flipped.left, attr("S", "b"));
        assert_eq!(flipped.op, CompareOp::Gt);
        assert_eq!(flipped.right_attribute(), Some(&attr("R", "a")));
        assert_eq!(flipped.flipped(), cond);
    }

    #[test]
    fn test_equi_join_detection() {
        assert!(Condition::join(attr("R", "a"), attr("S", "a")).is_equi_join());
        assert!(!Condition::join(attr("R", "a"), attr("R", "b")).is_equi_join());
        assert!(!Condition::select(attr("R", "a"), CompareOp::Eq, Value::Int(1)).is_equi_join());
    }

    #[test]
    fn test_other_table() {
        let cond = Condition::join(attr("R", "a"), attr("S", "a"));
        assert_eq!(cond.other_table("R"), Some("S"));
        assert_eq!(cond.other_table("S"), Some("R"));
        assert_eq!(cond.other_table("T"), None);
        assert!(cond.touches("S"));
    }

    #[test]
    fn test_op_holds() {
        assert!(CompareOp::Le.holds(Ordering::Equal));
        assert!(!CompareOp::Gt.holds(Ordering::Equal));
        assert!(CompareOp::Ne.holds(Ordering::Less));
        assert_eq!(CompareOp::from_symbol("<>"), Some(CompareOp::Ne));
    }
}

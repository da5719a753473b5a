//! Record model for qproc
//!
//! Typed values, attributes, schemas, tuples and the fixed-capacity
//! [`Batch`] (page) that is the unit of memory budgeting and run I/O.
//!
//! # Invariants
//!
//! - A schema's tuple size is the sum of its attribute widths
//! - `batch.len() <= batch.capacity()`; a full batch rejects further tuples
//! - Batch capacity is `page_size / tuple_size` and never zero

mod batch;
mod condition;
mod errors;
mod order;
mod schema;
mod tuple;
mod types;

pub use batch::Batch;
pub use condition::{CompareOp, Condition, Operand};
pub use errors::{RecordError, RecordResult};
pub use order::{SortDirection, SortKey, TupleComparator};
pub use schema::{Attribute, Schema};
pub use tuple::Tuple;
pub use types::{DataType, Value};

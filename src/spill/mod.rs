//! Auxiliary run storage for qproc
//!
//! Sorted runs and materialized join inputs are spilled here as files of
//! back-to-back serialized batches.
//!
//! # Format
//!
//! ```text
//! {"capacity":N,"tuples":[...]}\n
//! {"capacity":N,"tuples":[...]}\n
//! ...
//! ```
//!
//! Each batch is one self-delimiting JSON document. A reader detects the end
//! of a run by a clean end-of-stream. There is no stream header, so a run
//! written in several flushes still reads back as one sequence.
//!
//! # Invariants
//!
//! - Every run file name is unique within its execution (UUID tag + sequence)
//! - A run is written by exactly one phase and deleted once consumed
//! - Any I/O or decode failure is fatal; end-of-run is not an error

mod area;
mod errors;
mod run;

pub use area::SpillArea;
pub use errors::{SpillError, SpillErrorCode, SpillResult};
pub use run::{IndexedRunReader, RunReader, RunWriter, SortedRun};

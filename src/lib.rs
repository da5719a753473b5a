//! qproc - a memory-bounded, disk-spilling relational query processor
//!
//! Plans a query into a left-deep join tree and executes it through
//! pull-based operators that never hold more than a fixed number of pages
//! in memory, spilling sorted runs and join inputs to disk.

pub mod cli;
pub mod config;
pub mod engine;
pub mod observability;
pub mod operator;
pub mod optimizer;
pub mod record;
pub mod spill;

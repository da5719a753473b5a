//! Observability subsystem for qproc
//!
//! - Structured logging (one JSON object per line, on stderr)
//! - Per-execution counters
//! - Lifecycle event tracing around sort and join phases
//!
//! # Principles
//!
//! 1. Observability never changes execution results
//! 2. Synchronous, no background threads
//! 3. Deterministic field ordering
//!
//! # Usage
//!
//! ```ignore
//! use qproc::observability::{log_event_with_fields, Event, Logger, Severity};
//!
//! Logger::set_min_severity(Severity::Info);
//! log_event_with_fields(Event::SortMergeRound, &[("runs_in", "12")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

/// Log a lifecycle event at `severity` instead of the event's default
pub fn log_event_at(event: Event, severity: Severity, fields: &[(&str, &str)]) {
    Logger::log(severity, event.as_str(), fields);
}

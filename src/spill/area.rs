//! Spill area: where an execution's run files live and how they are named

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use super::errors::{SpillError, SpillResult};
use super::run::{IndexedRunReader, RunReader, RunWriter, SortedRun};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

/// Directory plus unique-name generator for one query execution.
///
/// Names are `{prefix}-{tag}-{seq}.run`; the tag is a UUID chosen per
/// execution and `seq` counts up from zero, so concurrent executions sharing
/// a directory never collide.
#[derive(Debug)]
pub struct SpillArea {
    dir: PathBuf,
    tag: String,
    next_seq: AtomicU64,
    metrics: Arc<MetricsRegistry>,
}

impl SpillArea {
    /// Opens the spill area at `dir`, creating the directory if missing
    pub fn new(dir: &Path, metrics: Arc<MetricsRegistry>) -> SpillResult<Self> {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| SpillError::write_failed(dir, e))?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            tag: Uuid::new_v4().simple().to_string(),
            next_seq: AtomicU64::new(0),
            metrics,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Allocates a fresh, unused run path
    pub fn allocate(&self, prefix: &str) -> PathBuf {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!("{}-{}-{}.run", prefix, self.tag, seq))
    }

    /// Starts a new run file
    pub fn create_run(&self, prefix: &str) -> SpillResult<RunWriter> {
        let writer = RunWriter::create(self.allocate(prefix), Arc::clone(&self.metrics))?;
        self.metrics.increment_runs_created();
        Ok(writer)
    }

    /// Opens a run for a front-to-back scan
    pub fn open_run(&self, run: &SortedRun) -> SpillResult<RunReader> {
        RunReader::open(run.path(), Arc::clone(&self.metrics))
    }

    /// Opens a run for reads by batch number
    pub fn open_indexed(&self, run: &SortedRun) -> SpillResult<IndexedRunReader> {
        IndexedRunReader::open(run, Arc::clone(&self.metrics))
    }

    /// Deletes a consumed run
    pub fn delete(&self, run: SortedRun) -> SpillResult<()> {
        fs::remove_file(run.path()).map_err(|e| SpillError::write_failed(run.path(), e))?;
        self.metrics.increment_runs_deleted();
        Ok(())
    }

    /// Removes a run that failed part way through being written
    pub fn abandon(&self, writer: RunWriter) {
        let path = writer.path().to_path_buf();
        drop(writer);
        match fs::remove_file(&path) {
            Ok(()) => self.metrics.increment_runs_deleted(),
            Err(e) => log_event_with_fields(
                Event::RunCleanupFailed,
                &[("path", &path.display().to_string()), ("error", &e.to_string())],
            ),
        }
    }

    /// Deletes a run on an abort path, logging instead of failing
    pub fn discard(&self, run: SortedRun) {
        let path = run.path().display().to_string();
        if let Err(e) = self.delete(run) {
            log_event_with_fields(
                Event::RunCleanupFailed,
                &[("path", &path), ("error", &e.to_string())],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Batch, Tuple, Value};
    use tempfile::TempDir;

    #[test]
    fn test_names_are_unique() {
        let dir = TempDir::new().unwrap();
        let area = SpillArea::new(dir.path(), Arc::new(MetricsRegistry::new())).unwrap();
        let a = area.allocate("sort");
        let b = area.allocate("sort");
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("sort-"));
    }

    #[test]
    fn test_two_areas_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let a = SpillArea::new(dir.path(), Arc::new(MetricsRegistry::new())).unwrap();
        let b = SpillArea::new(dir.path(), Arc::new(MetricsRegistry::new())).unwrap();
        assert_ne!(a.allocate("bnj"), b.allocate("bnj"));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("spill").join("q1");
        SpillArea::new(&nested, Arc::new(MetricsRegistry::new())).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_delete_removes_file_and_counts() {
        let dir = TempDir::new().unwrap();
        let metrics = Arc::new(MetricsRegistry::new());
        let area = SpillArea::new(dir.path(), Arc::clone(&metrics)).unwrap();

        let mut writer = area.create_run("t").unwrap();
        let mut batch = Batch::new(1);
        batch.push(Tuple::new(vec![Value::Int(1)])).unwrap();
        writer.write_batch(&batch).unwrap();
        let run = writer.finish().unwrap();
        let path = run.path().to_path_buf();
        assert!(path.exists());

        area.delete(run).unwrap();
        assert!(!path.exists());
        assert_eq!(metrics.snapshot().live_runs(), 0);
    }
}

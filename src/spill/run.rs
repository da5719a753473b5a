//! Run files: sequential writer, sequential reader and by-batch reader

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::de::IoRead;
use serde_json::error::Category;
use serde_json::StreamDeserializer;

use super::errors::{SpillError, SpillResult};
use crate::observability::MetricsRegistry;
use crate::record::Batch;

/// A finished run on auxiliary storage.
///
/// Holding a `SortedRun` means owning the file: whoever holds it is
/// responsible for deleting it through [`super::SpillArea::delete`].
#[derive(Debug)]
pub struct SortedRun {
    path: PathBuf,
    /// Byte offset at which each batch starts
    offsets: Vec<u64>,
    /// Total bytes in the file
    bytes: u64,
    tuples: usize,
}

impl SortedRun {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn batch_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn tuple_count(&self) -> usize {
        self.tuples
    }

    /// Size of the run file in bytes
    pub fn byte_len(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.tuples == 0
    }
}

/// Appends batches to a run file
pub struct RunWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    offsets: Vec<u64>,
    position: u64,
    tuples: usize,
    metrics: Arc<MetricsRegistry>,
}

impl RunWriter {
    /// Creates (or truncates) the run file at `path`
    pub(crate) fn create(path: PathBuf, metrics: Arc<MetricsRegistry>) -> SpillResult<Self> {
        let file = File::create(&path).map_err(|e| SpillError::write_failed(&path, e))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            offsets: Vec::new(),
            position: 0,
            tuples: 0,
            metrics,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of batches written so far
    pub fn batch_count(&self) -> usize {
        self.offsets.len()
    }

    /// Serializes `batch` at the end of the run
    pub fn write_batch(&mut self, batch: &Batch) -> SpillResult<()> {
        let mut bytes = serde_json::to_vec(batch)
            .map_err(|e| SpillError::write_failed_no_source(&self.path, e.to_string()))?;
        bytes.push(b'\n');

        self.writer
            .write_all(&bytes)
            .map_err(|e| SpillError::write_failed(&self.path, e))?;

        self.offsets.push(self.position);
        self.position += bytes.len() as u64;
        self.tuples += batch.len();
        self.metrics.increment_batches_written();
        Ok(())
    }

    /// Flushes the run and hands back ownership of the finished file
    pub fn finish(mut self) -> SpillResult<SortedRun> {
        self.writer
            .flush()
            .map_err(|e| SpillError::write_failed(&self.path, e))?;
        Ok(SortedRun {
            path: self.path,
            offsets: self.offsets,
            bytes: self.position,
            tuples: self.tuples,
        })
    }
}

/// Maps a decode failure to the right spill error.
///
/// A clean end of stream never reaches here; an EOF inside a document means
/// the run was truncated.
fn decode_error(path: &Path, err: serde_json::Error) -> SpillError {
    match err.classify() {
        Category::Io => SpillError::read_failed(path, std::io::Error::from(err)),
        Category::Eof => SpillError::corruption(path, format!("truncated batch: {}", err)),
        Category::Syntax | Category::Data => SpillError::corruption(path, err.to_string()),
    }
}

fn check_batch(path: &Path, batch: Batch) -> SpillResult<Batch> {
    if !batch.is_well_formed() {
        return Err(SpillError::corruption(
            path,
            format!(
                "batch holds {} tuples but has capacity {}",
                batch.len(),
                batch.capacity()
            ),
        ));
    }
    Ok(batch)
}

type BatchStream = StreamDeserializer<'static, IoRead<BufReader<File>>, Batch>;

/// Reads a run front to back, one batch at a time
pub struct RunReader {
    path: PathBuf,
    stream: BatchStream,
    metrics: Arc<MetricsRegistry>,
}

impl RunReader {
    pub(crate) fn open(path: &Path, metrics: Arc<MetricsRegistry>) -> SpillResult<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            stream: Self::open_stream(path)?,
            metrics,
        })
    }

    fn open_stream(path: &Path) -> SpillResult<BatchStream> {
        let file = File::open(path).map_err(|e| SpillError::read_failed(path, e))?;
        Ok(serde_json::Deserializer::from_reader(BufReader::new(file)).into_iter::<Batch>())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next batch, or `None` at end of run
    pub fn next_batch(&mut self) -> SpillResult<Option<Batch>> {
        match self.stream.next() {
            None => Ok(None),
            Some(Ok(batch)) => {
                self.metrics.increment_batches_read();
                check_batch(&self.path, batch).map(Some)
            }
            Some(Err(e)) => Err(decode_error(&self.path, e)),
        }
    }

    /// Restarts reading from the first batch
    pub fn rewind(&mut self) -> SpillResult<()> {
        self.stream = Self::open_stream(&self.path)?;
        Ok(())
    }
}

/// Reads individual batches of a run by batch number
pub struct IndexedRunReader {
    path: PathBuf,
    file: File,
    offsets: Vec<u64>,
    metrics: Arc<MetricsRegistry>,
}

impl IndexedRunReader {
    pub(crate) fn open(run: &SortedRun, metrics: Arc<MetricsRegistry>) -> SpillResult<Self> {
        let file = File::open(&run.path).map_err(|e| SpillError::read_failed(&run.path, e))?;
        Ok(Self {
            path: run.path.clone(),
            file,
            offsets: run.offsets.clone(),
            metrics,
        })
    }

    pub fn batch_count(&self) -> usize {
        self.offsets.len()
    }

    /// Reads batch number `index`, or `None` past the end of the run
    pub fn read_batch(&mut self, index: usize) -> SpillResult<Option<Batch>> {
        let Some(&offset) = self.offsets.get(index) else {
            return Ok(None);
        };

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| SpillError::read_failed(&self.path, e))?;

        let mut stream = serde_json::Deserializer::from_reader(BufReader::new(&self.file))
            .into_iter::<Batch>();
        match stream.next() {
            Some(Ok(batch)) => {
                self.metrics.increment_batches_read();
                check_batch(&self.path, batch).map(Some)
            }
            Some(Err(e)) => Err(decode_error(&self.path, e)),
            None => Err(SpillError::corruption(
                &self.path,
                format!("batch {} missing at offset {}", index, offset),
            )),
        }
    }
}

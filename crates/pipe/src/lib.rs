//! The single-writer result pipeline: many worker threads produce
//! [`ResultRecord`]s, one consumer thread persists or reduces them.
//!
//! The original used a `pthread_mutex`-guarded anonymous pipe and an
//! all-zero sentinel record to signal end-of-stream. Here, an
//! `std::sync::mpsc` channel gives the same multi-producer/single-consumer
//! shape with atomic whole-message delivery for free, and "every `Sender`
//! dropped" is already a well-defined end-of-stream — no sentinel record is
//! needed.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;

use thiserror::Error;
use tracing::{debug, warn};

use hpcsim_record::ResultRecord;

/// Failure modes for pipe construction and delivery.
#[derive(Debug, Error)]
pub enum PipeError {
    /// The receiving end has already been dropped.
    #[error("result pipe receiver has been closed")]
    Closed,
    /// The destination file could not be opened or written to.
    #[error("i/o error writing result: {0}")]
    Io(#[from] std::io::Error),
    /// A sink's `consume` call was contained by a fault shell; the record
    /// is dropped but the consumer loop continues.
    #[error("sink consume call faulted: {0}")]
    SinkFaulted(String),
}

/// The producer half of the pipe, cloned once per worker thread.
#[derive(Clone)]
pub struct ResultSender {
    inner: mpsc::Sender<ResultRecord>,
}

impl ResultSender {
    /// Hands a completed record to the consumer thread.
    pub fn send(&self, record: ResultRecord) -> Result<(), PipeError> {
        self.inner.send(record).map_err(|_| PipeError::Closed)
    }
}

/// The single consuming half of the pipe.
pub struct ResultReceiver {
    inner: mpsc::Receiver<ResultRecord>,
}

impl ResultReceiver {
    /// Blocks for the next record, returning `None` once every
    /// [`ResultSender`] has been dropped.
    pub fn recv(&self) -> Option<ResultRecord> {
        self.inner.recv().ok()
    }
}

/// Creates a fresh sender/receiver pair.
pub fn channel() -> (ResultSender, ResultReceiver) {
    let (tx, rx) = mpsc::channel();
    (ResultSender { inner: tx }, ResultReceiver { inner: rx })
}

/// A destination for completed records: either a flat file (persist mode)
/// or a plugin's reducer (reduce mode). Fault containment around a
/// reducer's callback is the caller's responsibility — this trait only
/// describes where bytes go.
pub trait ResultSink {
    /// Consumes one record. An error here is logged by
    /// [`run_consumer`] and does not stop the loop.
    fn consume(&mut self, record: &ResultRecord) -> Result<(), PipeError>;

    /// Called once, after the channel has closed and every record has been
    /// consumed.
    fn finish(&mut self) -> Result<(), PipeError> {
        Ok(())
    }
}

/// Appends each record's encoded bytes to a flat output file, used in
/// persist mode.
pub struct FileWriter {
    file: BufWriter<File>,
}

impl FileWriter {
    /// Opens `path` for appending, creating it if necessary. Used for a
    /// checkpointed run: new records land after the ones a previous run
    /// already wrote.
    pub fn open_append(path: impl AsRef<Path>) -> Result<Self, PipeError> {
        let file = File::options().create(true).append(true).open(path)?;
        Ok(Self {
            file: BufWriter::new(file),
        })
    }

    /// Opens `path` for writing, truncating any existing contents. Used for
    /// a non-checkpointed run, so re-running the same simulation against the
    /// same output path starts clean rather than accumulating duplicates.
    pub fn open_truncate(path: impl AsRef<Path>) -> Result<Self, PipeError> {
        let file = File::options().create(true).write(true).truncate(true).open(path)?;
        Ok(Self {
            file: BufWriter::new(file),
        })
    }
}

impl ResultSink for FileWriter {
    fn consume(&mut self, record: &ResultRecord) -> Result<(), PipeError> {
        self.file.write_all(&record.encode())?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PipeError> {
        self.file.flush()?;
        Ok(())
    }
}

/// Drains `receiver` until the channel closes, handing each record to
/// `sink`. A single record's failure is logged and skipped rather than
/// aborting the whole run, since later records are independent of it.
pub fn run_consumer(receiver: &ResultReceiver, sink: &mut dyn ResultSink) -> Result<usize, PipeError> {
    let mut count = 0usize;
    while let Some(record) = receiver.recv() {
        match sink.consume(&record) {
            Ok(()) => count += 1,
            Err(err) => warn!(error = %err, "failed to consume result record"),
        }
    }
    sink.finish()?;
    debug!(count, "result consumer drained");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct MemorySink {
        records: Arc<Mutex<Vec<ResultRecord>>>,
    }

    impl ResultSink for MemorySink {
        fn consume(&mut self, record: &ResultRecord) -> Result<(), PipeError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[test]
    fn delivers_all_records_in_send_order_per_sender() {
        let (tx, rx) = channel();
        let record = ResultRecord::new([1u8; 48], vec![9, 9]).unwrap();
        tx.send(record.clone()).unwrap();
        drop(tx);
        let records = Arc::new(Mutex::new(Vec::new()));
        let mut sink = MemorySink {
            records: Arc::clone(&records),
        };
        let count = run_consumer(&rx, &mut sink).unwrap();
        assert_eq!(count, 1);
        assert_eq!(records.lock().unwrap()[0], record);
    }

    #[test]
    fn closes_when_every_sender_drops() {
        let (tx, rx) = channel();
        drop(tx);
        assert!(rx.recv().is_none());
    }

    #[test]
    fn file_writer_round_trips_records() {
        let dir = std::env::temp_dir().join(format!("hpcsim-pipe-test-{}", std::process::id()));
        let record_a = ResultRecord::new([1u8; 48], vec![1, 2, 3]).unwrap();
        let record_b = ResultRecord::new([2u8; 48], vec![4, 5]).unwrap();
        {
            let mut writer = FileWriter::open_append(&dir).unwrap();
            writer.consume(&record_a).unwrap();
            writer.consume(&record_b).unwrap();
            writer.finish().unwrap();
        }
        let bytes = std::fs::read(&dir).unwrap();
        let (decoded_a, consumed) = ResultRecord::decode(&bytes).unwrap();
        let (decoded_b, _) = ResultRecord::decode(&bytes[consumed..]).unwrap();
        assert_eq!(decoded_a, record_a);
        assert_eq!(decoded_b, record_b);
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn file_writer_open_truncate_discards_prior_contents() {
        let dir = std::env::temp_dir().join(format!("hpcsim-pipe-test-trunc-{}", std::process::id()));
        let record_a = ResultRecord::new([1u8; 48], vec![1, 2, 3]).unwrap();
        let record_b = ResultRecord::new([2u8; 48], vec![4, 5]).unwrap();
        {
            let mut writer = FileWriter::open_append(&dir).unwrap();
            writer.consume(&record_a).unwrap();
            writer.finish().unwrap();
        }
        {
            let mut writer = FileWriter::open_truncate(&dir).unwrap();
            writer.consume(&record_b).unwrap();
            writer.finish().unwrap();
        }
        let bytes = std::fs::read(&dir).unwrap();
        let (decoded, consumed) = ResultRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, record_b);
        assert_eq!(consumed, bytes.len());
        let _ = std::fs::remove_file(&dir);
    }
}

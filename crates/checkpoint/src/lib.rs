//! Checkpoint-resume support: scanning an existing output file to find out
//! which events have already run, so a restarted host can skip them.
//!
//! Because events complete in whatever order their workers happen to
//! finish, a resumed run cannot assume the file holds a prefix of the
//! deterministic event sequence — it can only assume that *whichever*
//! digests are present were already fully processed. [`Checkpointer::scan`]
//! therefore does one linear pass over the file, collecting every digest it
//! finds into a set, so each of the (potentially much larger) event count's
//! membership checks afterward is O(1) instead of re-scanning the file per
//! event.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use hpcsim_record::{RecordError, ID_LEN};
use hpcsim_stream::StreamSequencer;

/// Failure modes for scanning a checkpoint file.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The file could not be opened or read.
    #[error("i/o error reading checkpoint file: {0}")]
    Io(#[from] std::io::Error),
    /// The file's contents could not be parsed as a sequence of records.
    #[error("malformed checkpoint file: {0}")]
    Malformed(#[from] RecordError),
}

/// The set of event digests already recorded in an existing output file.
#[derive(Debug, Default)]
pub struct Checkpointer {
    seen: HashSet<[u8; ID_LEN]>,
}

impl Checkpointer {
    /// Scans `path` for existing records, collecting their digests. A
    /// missing file is treated as an empty checkpoint (a fresh run), not an
    /// error.
    pub fn scan(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        let mut bytes = Vec::new();
        match File::open(path) {
            Ok(mut file) => {
                file.read_to_end(&mut bytes)?;
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no existing output file, starting fresh");
                return Ok(Self::default());
            }
            Err(err) => return Err(CheckpointError::Io(err)),
        }

        let mut seen = HashSet::new();
        let mut offset = 0usize;
        while offset < bytes.len() {
            let (record, consumed) = hpcsim_record::ResultRecord::decode(&bytes[offset..])?;
            seen.insert(*record.id());
            offset += consumed;
        }
        info!(records = seen.len(), path = %path.display(), "resumed from checkpoint");
        Ok(Self { seen })
    }

    /// True if a record with this digest has already been persisted.
    pub fn already_has(&self, digest: &[u8; ID_LEN]) -> bool {
        self.seen.contains(digest)
    }

    /// Number of distinct digests found during the scan.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True if the scan found no prior records.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Fast-forwards `sequencer` past the first `n` events unconditionally,
    /// used when the caller already knows a contiguous prefix was
    /// completed and wants to skip the per-event membership check entirely.
    pub fn fast_forward(sequencer: &StreamSequencer, n: u64) {
        sequencer.skip(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpcsim_record::ResultRecord;
    use hpcsim_stream::Stream;
    use std::io::Write;

    #[test]
    fn missing_file_is_an_empty_checkpoint() {
        let path = std::env::temp_dir().join("hpcsim-checkpoint-missing-does-not-exist");
        let checkpoint = Checkpointer::scan(&path).unwrap();
        assert!(checkpoint.is_empty());
    }

    #[test]
    fn finds_digests_already_present_in_the_file() {
        let path = std::env::temp_dir().join(format!(
            "hpcsim-checkpoint-test-{}",
            std::process::id()
        ));
        let stream = Stream::new([12345.0; 6]);
        let digest = stream.digest();
        let record = ResultRecord::new(digest, vec![1, 2, 3]).unwrap();
        {
            let mut file = File::create(&path).unwrap();
            file.write_all(&record.encode()).unwrap();
        }
        let checkpoint = Checkpointer::scan(&path).unwrap();
        assert!(checkpoint.already_has(&digest));
        assert_eq!(checkpoint.len(), 1);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unrelated_digest_is_not_marked_seen() {
        let path = std::env::temp_dir().join(format!(
            "hpcsim-checkpoint-test-b-{}",
            std::process::id()
        ));
        let present = Stream::new([12345.0; 6]).digest();
        let absent = Stream::new([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).digest();
        let record = ResultRecord::new(present, vec![]).unwrap();
        {
            let mut file = File::create(&path).unwrap();
            file.write_all(&record.encode()).unwrap();
        }
        let checkpoint = Checkpointer::scan(&path).unwrap();
        assert!(!checkpoint.already_has(&absent));
        let _ = std::fs::remove_file(&path);
    }
}

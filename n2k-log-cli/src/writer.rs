//! Rotating session log writer
//!
//! Each run of the logger writes one CSV file named `<base>NNN.csv`, where
//! `NNN` is the first free index from `000`. Existing files are never reused
//! or truncated. Every appended record is flushed and synced before
//! `append` returns, so a power loss costs at most the record being written.
//!
//! A write that fails part way can leave a torn last row. The writer never
//! touches the file again after a failure, so any torn row is always the
//! final line and CSV readers see it as a short record.

use n2k_log_decoder::record::{Record, HEADER};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Highest session index tried before giving up
pub const MAX_SESSION_INDEX: u32 = 999;

/// Write failures; all of them end the session
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error("No free session file for base {0:?}: indices 000-999 are taken")]
    NamesExhausted(PathBuf),

    #[error("Failed to create session file {path:?}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("Failed to serialize record: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error on session file: {0}")]
    Io(#[from] io::Error),

    #[error("Session writer stopped after an earlier failure")]
    Failed,

    #[error("Session writer is closed")]
    Closed,
}

/// A byte sink that can be forced to stable storage
pub trait DurableSink: Write {
    fn sync(&mut self) -> io::Result<()>;
}

impl DurableSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// `<base>NNN.csv` for a given index
fn session_path(base: &Path, index: u32) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(format!("{:03}.csv", index));
    PathBuf::from(name)
}

/// First `<base>NNN.csv` that does not exist yet
pub fn next_session_path(base: &Path) -> Result<PathBuf, WriterError> {
    (0..=MAX_SESSION_INDEX)
        .map(|index| session_path(base, index))
        .find(|path| !path.exists())
        .ok_or_else(|| WriterError::NamesExhausted(base.to_path_buf()))
}

/// Encode one CSV row
fn encode_row<F>(fill: F) -> Result<Vec<u8>, WriterError>
where
    F: FnOnce(&mut csv::Writer<Vec<u8>>) -> csv::Result<()>,
{
    let mut row = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    fill(&mut row)?;
    row.into_inner()
        .map_err(|e| WriterError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))
}

/// Append-only CSV writer for one logging session
pub struct RotatingLogWriter<S: DurableSink = File> {
    sink: Option<S>,
    path: PathBuf,
    records: u64,
    failed: bool,
}

impl RotatingLogWriter<File> {
    /// Create the next free session file under `base` and write its header
    pub fn open(base: &Path) -> Result<Self, WriterError> {
        let path = next_session_path(base)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| WriterError::Open {
                path: path.clone(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| WriterError::Open {
                path: path.clone(),
                source,
            })?;

        log::info!("Logging session to {:?}", path);
        Self::from_sink(file, path)
    }
}

impl<S: DurableSink> RotatingLogWriter<S> {
    /// Wrap an already opened sink; `path` is only used for reporting
    pub fn from_sink(mut sink: S, path: PathBuf) -> Result<Self, WriterError> {
        let header = encode_row(|row| row.write_record(HEADER))?;
        write_durably(&mut sink, &header)?;

        Ok(Self {
            sink: Some(sink),
            path,
            records: 0,
            failed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records durably written so far
    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Write one record and force it to storage.
    ///
    /// After the first failure of any kind every later call returns
    /// [`WriterError::Failed`].
    pub fn append(&mut self, record: &Record) -> Result<(), WriterError> {
        if self.failed {
            return Err(WriterError::Failed);
        }
        let sink = self.sink.as_mut().ok_or(WriterError::Closed)?;

        let result =
            encode_row(|row| row.serialize(record)).and_then(|row| write_durably(sink, &row));
        match result {
            Ok(()) => self.records += 1,
            Err(_) => self.failed = true,
        }
        result
    }

    /// Flush, sync and release the file. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<(), WriterError> {
        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };

        if self.failed {
            // Nothing more can be trusted to reach the device
            log::warn!(
                "Closing {:?} after a write failure ({} records written, last row may be torn)",
                self.path,
                self.records
            );
            return Ok(());
        }

        sink.flush()?;
        sink.sync()?;
        log::info!("Closed {:?} ({} records)", self.path, self.records);
        Ok(())
    }
}

fn write_durably<S: DurableSink>(sink: &mut S, bytes: &[u8]) -> Result<(), WriterError> {
    sink.write_all(bytes)?;
    sink.flush()?;
    sink.sync()?;
    Ok(())
}

impl<S: DurableSink> Drop for RotatingLogWriter<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Failed to close {:?}: {}", self.path, e);
        }
    }
}

/// In-memory sink with a switch that makes every write and sync fail, and an
/// optional capacity after which writes stop short
#[cfg(test)]
pub(crate) mod testing {
    use super::DurableSink;
    use std::io::{self, Write};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct MemorySink {
        pub bytes: Arc<Mutex<Vec<u8>>>,
        pub fail: Arc<AtomicBool>,
        pub syncs: Arc<AtomicUsize>,
        pub capacity: Arc<Mutex<Option<usize>>>,
    }

    impl MemorySink {
        pub fn contents(&self) -> String {
            String::from_utf8(self.bytes.lock().unwrap().clone()).unwrap()
        }

        pub fn fail_from_now_on(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }

        pub fn len(&self) -> usize {
            self.bytes.lock().unwrap().len()
        }

        pub fn limit_to(&self, capacity: Option<usize>) {
            *self.capacity.lock().unwrap() = capacity;
        }

        fn check(&self) -> io::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                Err(io::Error::new(io::ErrorKind::Other, "device unavailable"))
            } else {
                Ok(())
            }
        }
    }

    impl Write for MemorySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.check()?;
            let mut bytes = self.bytes.lock().unwrap();
            let room = match *self.capacity.lock().unwrap() {
                Some(capacity) => capacity.saturating_sub(bytes.len()),
                None => usize::MAX,
            };
            let take = buf.len().min(room);
            bytes.extend_from_slice(&buf[..take]);
            Ok(take)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.check()
        }
    }

    impl DurableSink for MemorySink {
        fn sync(&mut self) -> io::Result<()> {
            self.check()?;
            self.syncs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

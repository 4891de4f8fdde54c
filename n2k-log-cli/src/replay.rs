//! Capture file replay
//!
//! Feeds a YD RAW log, as saved by the gateway to its SD card, through the
//! same decode and write path as live traffic. Each line is handed over as
//! one datagram. Lines only carry a time of day, so record timestamps join
//! it to a start date, which rolls over when the time of day jumps back by
//! more than half a day.

use crate::listener::{DatagramSource, Incoming, ListenerError};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use n2k_log_decoder::{Datagram, Timestamp};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// A backwards step larger than this is taken as midnight passing
fn is_rollover(previous: NaiveTime, current: NaiveTime) -> bool {
    previous.signed_duration_since(current) > chrono::Duration::hours(12)
}

/// Time of day from the first field of a line, if it has one
fn gateway_time(line: &[u8]) -> Option<NaiveTime> {
    let text = std::str::from_utf8(line).ok()?;
    let field = text.split_whitespace().next()?;
    NaiveTime::parse_from_str(field, "%H:%M:%S%.f").ok()
}

pub struct FileReplay<R: BufRead = BufReader<File>> {
    reader: R,
    path: PathBuf,
    line: Vec<u8>,
    date: NaiveDate,
    last_time: Option<NaiveTime>,
    current: Timestamp,
    first: Option<Timestamp>,
    started: Instant,
    lines: u64,
}

impl FileReplay {
    /// Open `path` for replay; timestamps start on `date`
    pub fn open(path: &Path, date: NaiveDate) -> Result<Self, ListenerError> {
        let file = File::open(path).map_err(|source| ListenerError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Replaying {:?} starting on {}", path, date);
        Ok(Self::from_reader(BufReader::new(file), path.to_path_buf(), date))
    }
}

impl<R: BufRead> FileReplay<R> {
    pub fn from_reader(reader: R, path: PathBuf, date: NaiveDate) -> Self {
        Self {
            reader,
            path,
            line: Vec::new(),
            date,
            last_time: None,
            current: Utc.from_utc_datetime(&date.and_time(NaiveTime::default())),
            first: None,
            started: Instant::now(),
            lines: 0,
        }
    }

    /// Lines read so far
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Wall-clock time of the current line; unreadable times keep the last one
    fn advance_clock(&mut self) -> Timestamp {
        if let Some(time) = gateway_time(&self.line) {
            if self.last_time.is_some_and(|previous| is_rollover(previous, time)) {
                self.date = self.date.succ_opt().unwrap_or(self.date);
            }
            self.last_time = Some(time);
            self.current = Utc.from_utc_datetime(&self.date.and_time(time));
        }
        self.current
    }

    /// Monotonic instant matching `at`, so staleness follows capture time
    fn instant_for(&mut self, at: Timestamp) -> Instant {
        let first = *self.first.get_or_insert(at);
        self.started + (at - first).to_std().unwrap_or_default()
    }
}

impl<R: BufRead> DatagramSource for FileReplay<R> {
    fn poll(&mut self) -> Result<Incoming<'_>, ListenerError> {
        self.line.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.line)
            .map_err(|source| ListenerError::Read {
                path: self.path.clone(),
                source,
            })?;

        if read == 0 {
            log::info!("Replayed {} lines from {:?}", self.lines, self.path);
            return Ok(Incoming::Closed);
        }
        self.lines += 1;

        let received_at = self.advance_clock();
        let instant = self.instant_for(received_at);
        Ok(Incoming::Datagram(Datagram {
            bytes: &self.line,
            received_at,
            instant,
        }))
    }
}

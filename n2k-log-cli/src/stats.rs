//! Session statistics and periodic timers

use n2k_log_decoder::DecoderStats;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// What a logging session did, reported at shutdown and in status lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub path: PathBuf,
    pub elapsed: Duration,
    pub decoder: DecoderStats,
    pub records: u64,
    pub transient_errors: u64,
}

impl SessionSummary {
    /// Every recoverable problem seen, decoding and receiving alike
    pub fn anomalies(&self) -> u64 {
        self.decoder.anomalies() + self.transient_errors
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} datagrams, {} frames, {} records, {} filtered, {} anomalies \
             ({} malformed, {} out of sequence, {} orphaned, {} stale) in {}s",
            self.decoder.datagrams,
            self.decoder.frames,
            self.records,
            self.decoder.filtered,
            self.anomalies(),
            self.decoder.malformed,
            self.decoder.reassembly.out_of_sequence,
            self.decoder.reassembly.orphaned,
            self.decoder.reassembly.stale_evicted,
            self.elapsed.as_secs()
        )
    }
}

/// Fires at most once per period; a `None` period never fires
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    period: Option<Duration>,
    last: Instant,
}

impl Ticker {
    pub fn new(period: Option<Duration>, start: Instant) -> Self {
        Self {
            period,
            last: start,
        }
    }

    /// True (and re-armed) when a full period has passed since the last tick
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.period {
            Some(period) if now.saturating_duration_since(self.last) >= period => {
                self.last = now;
                true
            }
            _ => false,
        }
    }

    /// Re-arm without firing
    pub fn reset(&mut self, now: Instant) {
        self.last = now;
    }
}

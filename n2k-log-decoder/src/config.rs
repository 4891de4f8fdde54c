//! Decoder configuration types
//!
//! This module defines the configuration needed by the decoder library: the
//! fast-packet reassembly timeout, additional fast-packet PGNs, and an optional
//! PGN allow-list. Everything else (sockets, files, logging) belongs to the
//! application layer.

use crate::types::{DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Well-known NMEA 2000 PGNs transported as fast packets
const FAST_PACKET_PGNS: &[u32] = &[
    126208, 126464, 126983, 126984, 126985, 126986, 126987, 126988, 126996, 126998, 127233,
    127237, 127489, 127496, 127497, 127498, 127503, 127504, 127506, 127507, 127509, 127510,
    127511, 127512, 127513, 127514, 128275, 128520, 129029, 129038, 129039, 129040, 129041,
    129044, 129045, 129284, 129285, 129301, 129302, 129538, 129540, 129541, 129542, 129545,
    129547, 129549, 129551, 129556, 129792, 129793, 129794, 129795, 129796, 129797, 129798,
    129799, 129800, 129801, 129802, 129803, 129804, 129805, 129806, 129807, 129808, 129809,
    129810, 130052, 130053, 130054, 130060, 130061, 130064, 130065, 130066, 130067, 130068,
    130069, 130070, 130071, 130072, 130073, 130074, 130320, 130321, 130322, 130323, 130324,
    130567, 130577, 130578,
];

/// Proprietary fast-packet PGN (addressed)
const PROPRIETARY_FAST_PACKET_PGN: u32 = 126720;

/// Proprietary fast-packet PGN range (broadcast)
const PROPRIETARY_FAST_PACKET_RANGE: std::ops::RangeInclusive<u32> = 130816..=131071;

/// Configuration for the decoder library
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Age after which an incomplete fast-packet sequence is discarded (ms)
    #[serde(default = "default_fast_packet_timeout")]
    pub fast_packet_timeout_ms: u64,

    /// PGNs to reassemble as fast packets in addition to the built-in table
    #[serde(default)]
    pub extra_fast_packet_pgns: Vec<u32>,

    /// Optional: only decode these PGNs
    #[serde(default)]
    pub pgn_filter: Option<Vec<u32>>,
}

fn default_fast_packet_timeout() -> u64 {
    2000
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            fast_packet_timeout_ms: default_fast_packet_timeout(),
            extra_fast_packet_pgns: Vec::new(),
            pgn_filter: None,
        }
    }
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the fast-packet staleness timeout
    pub fn with_fast_packet_timeout(mut self, timeout: Duration) -> Self {
        self.fast_packet_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method: treat an additional PGN as fast packet
    pub fn add_fast_packet_pgn(mut self, pgn: u32) -> Self {
        self.extra_fast_packet_pgns.push(pgn);
        self
    }

    /// Builder method: set PGN filter
    pub fn with_pgn_filter(mut self, pgns: Vec<u32>) -> Self {
        self.pgn_filter = Some(pgns);
        self
    }

    /// Fast-packet staleness timeout
    pub fn fast_packet_timeout(&self) -> Duration {
        Duration::from_millis(self.fast_packet_timeout_ms)
    }

    /// Check if a PGN is reassembled from multiple frames
    pub fn is_fast_packet(&self, pgn: u32) -> bool {
        FAST_PACKET_PGNS.binary_search(&pgn).is_ok()
            || pgn == PROPRIETARY_FAST_PACKET_PGN
            || PROPRIETARY_FAST_PACKET_RANGE.contains(&pgn)
            || self.extra_fast_packet_pgns.contains(&pgn)
    }

    /// Check if a PGN should be processed
    pub fn should_process_pgn(&self, pgn: u32) -> bool {
        match &self.pgn_filter {
            Some(pgns) => pgns.contains(&pgn),
            None => true,
        }
    }

    /// Reject settings the reassembler cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.fast_packet_timeout_ms == 0 {
            return Err(DecoderError::InvalidConfig(
                "fast_packet_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(pgns) = &self.pgn_filter {
            if pgns.is_empty() {
                return Err(DecoderError::InvalidConfig(
                    "pgn_filter is empty; remove it to log every PGN".to_string(),
                ));
            }
        }
        Ok(())
    }
}

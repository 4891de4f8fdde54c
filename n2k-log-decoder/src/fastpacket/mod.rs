//! NMEA 2000 fast-packet reassembly
//!
//! Rebuilds messages longer than one CAN frame. The first frame of a sequence
//! (frame counter 0) carries the total length in its second byte and up to six
//! payload bytes; every following frame carries up to seven more. The first
//! data byte of each frame packs a 3-bit sequence id and a 5-bit frame counter.
//!
//! State is keyed by (source, PGN). At most one sequence is in flight per key:
//! a new first frame silently replaces an unfinished one. Sequences that never
//! complete are dropped by [`FastPacketAssembler::evict_stale`], which keeps
//! memory bounded on a noisy bus.
//!
//! A discarded sequence (out of sequence or stale) leaves a short-lived marker
//! so its remaining fragments are absorbed quietly instead of each one being
//! reported as an orphan. The marker goes away with the next first frame for
//! the key or once it is older than the timeout.

use crate::config::DecoderConfig;
use crate::types::{DecoderError, Direction, Frame, Message, Result, Timestamp};
use chrono::NaiveTime;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Maximum payload a fast-packet sequence can carry (6 + 31 * 7 bytes)
pub const MAX_FAST_PACKET_PAYLOAD: usize = 223;

/// Payload bytes carried by the first frame of a sequence
const FIRST_FRAME_DATA: usize = 6;

/// Identifies one in-flight sequence: (source address, PGN)
pub type ReassemblyKey = (u8, u32);

/// Outcome of feeding one frame to the assembler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    /// The frame completed a message (or was a message on its own)
    MessageComplete(Message),
    /// Frame stored, more fragments are needed
    FragmentConsumed,
    /// Continuation frame without a sequence in progress
    Orphaned,
    /// Continuation frame for a sequence that had already timed out
    StaleDiscarded,
    /// Remaining fragment of a sequence that was already discarded
    Absorbed,
}

/// Counters describing what the assembler has seen so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    pub completed: u64,
    pub superseded: u64,
    pub out_of_sequence: u64,
    pub orphaned: u64,
    pub stale_evicted: u64,
    /// Leftover fragments of discarded sequences; not anomalies
    pub absorbed: u64,
}

/// Remembers a discarded sequence until its leftovers stop arriving
#[derive(Debug, Clone, Copy)]
struct Discarded {
    sequence_id: u8,
    since: Instant,
}

/// An incomplete fast-packet message
#[derive(Debug, Clone)]
struct PartialMessage {
    timestamp: Timestamp,
    gateway_time: NaiveTime,
    direction: Direction,
    priority: u8,
    destination: u8,
    sequence_id: u8,
    last_counter: u8,
    expected_len: usize,
    payload: Vec<u8>,
    created: Instant,
}

impl PartialMessage {
    fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.created) > timeout
    }

    fn is_complete(&self) -> bool {
        self.payload.len() >= self.expected_len
    }

    fn into_message(self, (source, pgn): ReassemblyKey) -> Message {
        Message {
            timestamp: self.timestamp,
            gateway_time: self.gateway_time,
            direction: self.direction,
            pgn,
            source,
            destination: self.destination,
            priority: self.priority,
            payload: self.payload,
            fast_packet: true,
        }
    }
}

/// Fast-packet assembler owning all in-flight sequences
#[derive(Debug)]
pub struct FastPacketAssembler {
    config: DecoderConfig,
    partials: HashMap<ReassemblyKey, PartialMessage>,
    discarded: HashMap<ReassemblyKey, Discarded>,
    stats: ReassemblyStats,
}

impl FastPacketAssembler {
    /// Create an assembler using the fast-packet table and timeout of `config`
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            config: config.clone(),
            partials: HashMap::new(),
            discarded: HashMap::new(),
            stats: ReassemblyStats::default(),
        }
    }

    /// Number of sequences currently in flight
    pub fn pending(&self) -> usize {
        self.partials.len()
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Process one frame received at `now`.
    ///
    /// Frames of single-frame PGNs are promoted straight away. Out-of-sequence
    /// continuations discard the sequence and are reported as an error once.
    pub fn process_frame(&mut self, frame: Frame, now: Instant) -> Result<ProcessResult> {
        if !self.config.is_fast_packet(frame.pgn) {
            self.stats.completed += 1;
            return Ok(ProcessResult::MessageComplete(Message::from_single_frame(
                frame,
            )));
        }

        if frame.data.is_empty() {
            return Err(DecoderError::malformed(format!(
                "empty fast-packet frame for PGN {} from {}",
                frame.pgn, frame.source
            )));
        }

        if frame.frame_counter() == 0 {
            self.start_sequence(frame, now)
        } else {
            self.continue_sequence(frame, now)
        }
    }

    fn start_sequence(&mut self, frame: Frame, now: Instant) -> Result<ProcessResult> {
        let key = (frame.source, frame.pgn);

        if frame.data.len() < 2 {
            return Err(DecoderError::malformed(format!(
                "fast-packet first frame for PGN {} from {} has no length byte",
                frame.pgn, frame.source
            )));
        }

        let expected_len = frame.data[1] as usize;
        if !(1..=MAX_FAST_PACKET_PAYLOAD).contains(&expected_len) {
            return Err(DecoderError::malformed(format!(
                "fast-packet length {} for PGN {} from {} out of range",
                expected_len, frame.pgn, frame.source
            )));
        }

        self.discarded.remove(&key);
        if self.partials.remove(&key).is_some() {
            // The sender restarted the sequence
            self.stats.superseded += 1;
            log::debug!(
                "Fast-packet sequence for PGN {} from {} superseded by a new first frame",
                frame.pgn,
                frame.source
            );
        }

        let take = expected_len.min(FIRST_FRAME_DATA).min(frame.data.len() - 2);
        let mut payload = Vec::with_capacity(expected_len);
        payload.extend_from_slice(&frame.data[2..2 + take]);

        let partial = PartialMessage {
            timestamp: frame.timestamp,
            gateway_time: frame.gateway_time,
            direction: frame.direction,
            priority: frame.priority,
            destination: frame.destination,
            sequence_id: frame.sequence_id(),
            last_counter: 0,
            expected_len,
            payload,
            created: now,
        };

        if partial.is_complete() {
            self.stats.completed += 1;
            return Ok(ProcessResult::MessageComplete(partial.into_message(key)));
        }

        log::trace!(
            "Fast-packet sequence started for PGN {} from {} ({} bytes)",
            frame.pgn,
            frame.source,
            expected_len
        );
        self.partials.insert(key, partial);
        Ok(ProcessResult::FragmentConsumed)
    }

    fn continue_sequence(&mut self, frame: Frame, now: Instant) -> Result<ProcessResult> {
        let key = (frame.source, frame.pgn);
        let timeout = self.config.fast_packet_timeout();

        let Some(partial) = self.partials.get_mut(&key) else {
            if self.absorbs(key, &frame, now, timeout) {
                self.stats.absorbed += 1;
                log::trace!(
                    "Absorbed fragment {} of discarded sequence for PGN {} from {}",
                    frame.frame_counter(),
                    frame.pgn,
                    frame.source
                );
                return Ok(ProcessResult::Absorbed);
            }
            self.stats.orphaned += 1;
            log::debug!(
                "Orphaned fast-packet frame {} for PGN {} from {}",
                frame.frame_counter(),
                frame.pgn,
                frame.source
            );
            return Ok(ProcessResult::Orphaned);
        };

        if partial.is_stale(now, timeout) {
            let sequence_id = partial.sequence_id;
            self.partials.remove(&key);
            self.stats.stale_evicted += 1;
            self.mark_discarded(key, sequence_id, now);
            log::debug!(
                "Stale fast-packet sequence for PGN {} from {} discarded",
                frame.pgn,
                frame.source
            );
            return Ok(ProcessResult::StaleDiscarded);
        }

        let expected = partial.last_counter + 1;
        let counter = frame.frame_counter();
        if frame.sequence_id() != partial.sequence_id || counter != expected {
            let sequence_id = partial.sequence_id;
            self.partials.remove(&key);
            self.stats.out_of_sequence += 1;
            self.mark_discarded(key, sequence_id, now);
            return Err(DecoderError::OutOfSequence {
                address: frame.source,
                pgn: frame.pgn,
                expected,
                got: counter,
            });
        }

        partial.last_counter = counter;
        let remaining = partial.expected_len - partial.payload.len();
        let take = remaining.min(frame.data.len() - 1);
        partial.payload.extend_from_slice(&frame.data[1..1 + take]);

        if !partial.is_complete() {
            return Ok(ProcessResult::FragmentConsumed);
        }

        match self.partials.remove(&key) {
            Some(done) => {
                self.stats.completed += 1;
                Ok(ProcessResult::MessageComplete(done.into_message(key)))
            }
            None => Ok(ProcessResult::FragmentConsumed),
        }
    }

    fn mark_discarded(&mut self, key: ReassemblyKey, sequence_id: u8, now: Instant) {
        self.discarded.insert(
            key,
            Discarded {
                sequence_id,
                since: now,
            },
        );
    }

    /// True when `frame` belongs to a recently discarded sequence
    fn absorbs(&self, key: ReassemblyKey, frame: &Frame, now: Instant, timeout: Duration) -> bool {
        self.discarded.get(&key).is_some_and(|discarded| {
            discarded.sequence_id == frame.sequence_id()
                && now.saturating_duration_since(discarded.since) <= timeout
        })
    }

    /// Drop every sequence older than the configured timeout.
    ///
    /// Returns the number of sequences evicted.
    pub fn evict_stale(&mut self, now: Instant) -> usize {
        let timeout = self.config.fast_packet_timeout();
        let before = self.partials.len();

        self.discarded
            .retain(|_, discarded| now.saturating_duration_since(discarded.since) <= timeout);

        let mut evicted = Vec::new();
        self.partials.retain(|&(source, pgn), partial| {
            let stale = partial.is_stale(now, timeout);
            if stale {
                evicted.push(((source, pgn), partial.sequence_id));
                log::debug!(
                    "Evicting stale fast-packet sequence for PGN {} from {} ({}/{} bytes)",
                    pgn,
                    source,
                    partial.payload.len(),
                    partial.expected_len
                );
            }
            !stale
        });

        for (key, sequence_id) in evicted {
            self.mark_discarded(key, sequence_id, now);
        }

        let evicted = before - self.partials.len();
        self.stats.stale_evicted += evicted as u64;
        evicted
    }
}

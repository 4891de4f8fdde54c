//! Core types for the NMEA 2000 log decoder library
//!
//! This module defines the fundamental types that flow through the decoder:
//! raw datagrams handed over by the network layer, decoded CAN frames, and
//! complete (possibly reassembled) NMEA 2000 messages.

use chrono::{DateTime, NaiveTime, Utc};
use std::fmt;
use std::time::Instant;

/// Timestamp type used throughout the decoder
pub type Timestamp = DateTime<Utc>;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Destination address used by broadcast (PDU2) messages
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// Payload capacity of a single classic CAN frame
pub const MAX_FRAME_DATA: usize = 8;

/// A datagram as received from the gateway, borrowed from the receive buffer.
///
/// The decoder never keeps a reference past the iterator that reads it.
#[derive(Debug, Clone, Copy)]
pub struct Datagram<'a> {
    /// Raw payload bytes
    pub bytes: &'a [u8],
    /// Wall-clock arrival time
    pub received_at: Timestamp,
    /// Monotonic arrival time, used for reassembly staleness
    pub instant: Instant,
}

impl<'a> Datagram<'a> {
    /// Wrap a payload received right now
    pub fn now(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            received_at: Utc::now(),
            instant: Instant::now(),
        }
    }
}

/// Direction of a frame as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// From the NMEA 2000 bus to the application
    Received,
    /// From the application to the NMEA 2000 bus
    Transmitted,
}

impl Direction {
    /// Single-letter wire marker (`R` / `T`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Received => "R",
            Direction::Transmitted => "T",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One CAN frame decoded from a gateway datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Arrival time of the datagram that carried this frame
    pub timestamp: Timestamp,
    /// Time of day stamped by the gateway (millisecond resolution)
    pub gateway_time: NaiveTime,
    /// Frame direction
    pub direction: Direction,
    /// Full 29-bit CAN identifier
    pub can_id: u32,
    /// Priority (0-7)
    pub priority: u8,
    /// Parameter group number
    pub pgn: u32,
    /// Source address
    pub source: u8,
    /// Destination address (255 for broadcast)
    pub destination: u8,
    /// Data bytes (1-8)
    pub data: Vec<u8>,
}

impl Frame {
    /// Fast-packet frame counter (bits 0-4 of the first data byte)
    pub fn frame_counter(&self) -> u8 {
        self.data.first().map(|b| b & 0x1F).unwrap_or(0)
    }

    /// Fast-packet sequence identifier (bits 5-7 of the first data byte)
    pub fn sequence_id(&self) -> u8 {
        self.data.first().map(|b| (b >> 5) & 0x07).unwrap_or(0)
    }

    /// Data length code - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

/// A complete NMEA 2000 message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Arrival time of the first frame
    pub timestamp: Timestamp,
    /// Gateway time of the first frame
    pub gateway_time: NaiveTime,
    /// Direction of the first frame
    pub direction: Direction,
    /// Parameter group number
    pub pgn: u32,
    /// Source address
    pub source: u8,
    /// Destination address
    pub destination: u8,
    /// Priority (0-7)
    pub priority: u8,
    /// Complete payload
    pub payload: Vec<u8>,
    /// True if the payload was reassembled from a fast-packet sequence
    pub fast_packet: bool,
}

impl Message {
    /// Promote a single frame to a message without any reassembly
    pub fn from_single_frame(frame: Frame) -> Self {
        Self {
            timestamp: frame.timestamp,
            gateway_time: frame.gateway_time,
            direction: frame.direction,
            pgn: frame.pgn,
            source: frame.source,
            destination: frame.destination,
            priority: frame.priority,
            payload: frame.data,
            fast_packet: false,
        }
    }
}

/// Errors that can occur during decoding
///
/// None of these are fatal: the caller logs them, counts them and moves on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecoderError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error(
        "Out of sequence fast-packet frame for PGN {pgn} from {address}: expected counter {expected}, got {got}"
    )]
    OutOfSequence {
        address: u8,
        pgn: u32,
        expected: u8,
        got: u8,
    },

    #[error("Invalid decoder configuration: {0}")]
    InvalidConfig(String),
}

impl DecoderError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        DecoderError::MalformedFrame(reason.into())
    }
}

//! NMEA 2000 Log Decoder Library
//!
//! A reusable, I/O-free library for decoding NMEA 2000 traffic relayed by a
//! Wi-Fi gateway as UDP datagrams.
//!
//! # Architecture
//!
//! This library is intentionally minimal and focused on decoding:
//! - Parses gateway datagrams (Yacht Devices RAW text) into CAN frames
//! - Decomposes 29-bit identifiers into priority, PGN, source and destination
//! - Reassembles fast-packet (multi-frame) messages with staleness eviction
//! - Maps complete messages onto flat log records
//!
//! The library does NOT:
//! - Own sockets or files
//! - Interpret parameter values
//! - Transmit on the bus
//!
//! Capture, session files and lifecycle live in the application layer (n2k-log-cli).
//!
//! # Example Usage
//!
//! ```
//! use n2k_log_decoder::{Datagram, Decoder, DecoderConfig, Record};
//!
//! let mut decoder = Decoder::new(DecoderConfig::new()).unwrap();
//!
//! let payload = b"10:00:00.000 R 19F51307 40 0E 01 02 03 04 05 06\r\n\
//!                 10:00:00.001 R 19F51307 41 07 08 09 0A 0B 0C 0D\r\n\
//!                 10:00:00.002 R 19F51307 42 0E FF FF FF FF FF FF\r\n";
//!
//! let records: Vec<Record> = decoder
//!     .decode_datagram(Datagram::now(payload))
//!     .filter_map(|message| message.ok())
//!     .map(|message| Record::from(&message))
//!     .collect();
//!
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].pgn, 128275);
//! assert_eq!(records[0].data, "0102030405060708090A0B0C0D0E");
//! ```

// Public modules
pub mod can_id;
pub mod config;
pub mod decoder;
pub mod fastpacket;
pub mod formats;
pub mod record;
pub mod types;

// Re-export main types for convenience
pub use config::DecoderConfig;
pub use decoder::{Decoder, DecoderStats};
pub use fastpacket::ReassemblyStats;
pub use record::Record;
pub use types::{
    Datagram, DecoderError, Direction, Frame, Message, Result, Timestamp, BROADCAST_ADDRESS,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
